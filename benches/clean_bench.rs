use criterion::{black_box, criterion_group, criterion_main, Criterion};
use wikicorpus::config::DocumentType;
use wikicorpus::markers::Markers;
use wikicorpus::processing::segment::split_sentences;
use wikicorpus::processing::{Cleaner, Segmenter};

const ARTICLE: &str = r#"{{Short description|Capital city of France}}
{{Infobox settlement
| name = Paris
| population_total = 2,102,650
| image = {{Multiple image|a.jpg|b.jpg}}
}}
'''Paris''' is the [[capital city|capital]] and most populous city of [[France]].<ref name="insee">{{cite web|url=https://www.insee.fr|title=Populations}}</ref> It lies on the [[Seine]] river, in the north of the country.

== History ==
The [[Parisii]], a sub-tribe of the Celtic [[Senones]], inhabited the Paris area from around the middle of the 3rd century BC.<!-- check date --> In 52 BC, the Romans conquered the [[Paris Basin]].

[[File:Paris night.jpg|thumb|Paris at night, seen from the [[Eiffel Tower]]]]
{| class="wikitable"
|-
! Year !! Population
|-
| 1800 || 546,856
|}
By the end of the 12th century, Paris had become the political, economic, religious, and cultural capital of France.&nbsp;See [https://example.org the archives] for details.

[[Category:Capitals in Europe]]
[[de:Paris]]
"#;

pub fn clean(c: &mut Criterion) {
    let cleaner = Cleaner::default();
    c.bench_function("clean_article", |b| {
        b.iter(|| cleaner.clean(black_box("Paris"), black_box(ARTICLE)))
    });
}

pub fn segment(c: &mut Criterion) {
    let cleaned = Cleaner::default().clean("Paris", ARTICLE);
    for document_type in [DocumentType::Sentence, DocumentType::Article] {
        let segmenter = Segmenter::new(document_type, Markers::default());
        c.bench_function(&format!("segment_{document_type}"), |b| {
            b.iter(|| segmenter.segment(black_box(&cleaned)))
        });
    }
}

pub fn sentences(c: &mut Criterion) {
    let text = "Dr. Smith arrived in St. Louis on Jan. 5. He left the next day. \
                \"Was it worth it?\" he asked. Nobody answered (at least not aloud).";
    c.bench_function("split_sentences", |b| {
        b.iter(|| split_sentences(black_box(text)))
    });
}

criterion_group!(benches, clean, segment, sentences);
criterion_main!(benches);
