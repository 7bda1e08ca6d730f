use docshelf_core::traits::{LexicalFields, LexicalIndexer};
use docshelf_core::types::DocId;
use docshelf_lexical::LexicalIndex;
use tempfile::TempDir;

fn fields(text: &str, path: &str) -> LexicalFields {
    LexicalFields {
        text: text.to_string(),
        tags: Vec::new(),
        caption: None,
        path: path.to_string(),
    }
}

fn open_index(tmp: &TempDir) -> LexicalIndex {
    LexicalIndex::open(&tmp.path().join("lexical")).expect("open index")
}

#[test]
fn search_ranks_matches_and_breaks_ties_by_id() {
    let tmp = TempDir::new().expect("tempdir");
    let index = open_index(&tmp);
    // Equal term frequency and length: identical scores, id decides.
    index.index(DocId(2), &fields("invoice april", "/lib/b.txt")).expect("index");
    index.index(DocId(1), &fields("invoice march", "/lib/a.txt")).expect("index");
    index.index(DocId(3), &fields("vacation photo", "/lib/c.txt")).expect("index");

    let hits = index.search("invoice", 10).expect("search");
    let ids: Vec<DocId> = hits.iter().map(|h| h.id).collect();
    assert_eq!(ids, vec![DocId(1), DocId(2)]);
    assert!((hits[0].score - hits[1].score).abs() < 1e-6);

    // Same query, same index: identical ordering.
    let again = index.search("invoice", 10).expect("search");
    assert_eq!(ids, again.iter().map(|h| h.id).collect::<Vec<_>>());
}

#[test]
fn reindex_replaces_prior_postings() {
    let tmp = TempDir::new().expect("tempdir");
    let index = open_index(&tmp);
    index.index(DocId(1), &fields("quarterly budget report", "/lib/a.txt")).expect("index");
    assert_eq!(index.search("budget", 10).expect("search").len(), 1);

    index.index(DocId(1), &fields("travel itinerary", "/lib/a.txt")).expect("reindex");
    assert!(index.search("budget", 10).expect("search").is_empty());
    assert_eq!(index.search("itinerary", 10).expect("search").len(), 1);
}

#[test]
fn removed_documents_never_come_back() {
    let tmp = TempDir::new().expect("tempdir");
    let index = open_index(&tmp);
    index.index(DocId(1), &fields("invoice march", "/lib/a.txt")).expect("index");
    index.index(DocId(2), &fields("invoice april", "/lib/b.txt")).expect("index");

    index.remove(DocId(2)).expect("remove");
    let ids: Vec<DocId> =
        index.search("invoice", 10).expect("search").iter().map(|h| h.id).collect();
    assert_eq!(ids, vec![DocId(1)]);

    // Removing an unknown id is a no-op, not an error.
    index.remove(DocId(99)).expect("remove unknown");
}

#[test]
fn tags_and_caption_are_searchable() {
    let tmp = TempDir::new().expect("tempdir");
    let index = open_index(&tmp);
    let doc = LexicalFields {
        text: "scanned page".to_string(),
        tags: vec!["finance".to_string(), "2024".to_string()],
        caption: Some("signed contract".to_string()),
        path: "/lib/contract.pdf".to_string(),
    };
    index.index(DocId(5), &doc).expect("index");

    assert_eq!(index.search("finance", 10).expect("search").len(), 1);
    assert_eq!(index.search("contract", 10).expect("search").len(), 1);
}

#[test]
fn queries_are_case_folded_and_lenient() {
    let tmp = TempDir::new().expect("tempdir");
    let index = open_index(&tmp);
    index.index(DocId(1), &fields("Invoice March", "/lib/a.txt")).expect("index");

    assert_eq!(index.search("INVOICE", 10).expect("search").len(), 1);
    // A malformed query degrades to whatever parses, never an error.
    let hits = index.search("invoice AND ((", 10).expect("lenient search");
    assert!(hits.len() <= 1);
    assert!(index.search("", 10).expect("empty query").is_empty());
}

#[test]
fn index_survives_reopen() {
    let tmp = TempDir::new().expect("tempdir");
    {
        let index = open_index(&tmp);
        index.index(DocId(1), &fields("invoice march", "/lib/a.txt")).expect("index");
    }
    let reopened = open_index(&tmp);
    assert_eq!(reopened.search("invoice", 10).expect("search").len(), 1);
}

#[test]
fn update_path_keeps_the_document_searchable() {
    let tmp = TempDir::new().expect("tempdir");
    let index = open_index(&tmp);
    index.index(DocId(1), &fields("invoice march", "/lib/a.txt")).expect("index");

    index.update_path(DocId(1), "/lib/archive/a.txt").expect("update path");
    let hits = index.search("invoice", 10).expect("search");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, DocId(1));

    // Unknown ids are a no-op.
    index.update_path(DocId(99), "/lib/nowhere.txt").expect("unknown id");
}

#[test]
fn zero_limit_returns_nothing() {
    let tmp = TempDir::new().expect("tempdir");
    let index = open_index(&tmp);
    index.index(DocId(1), &fields("invoice march", "/lib/a.txt")).expect("index");
    assert!(index.search("invoice", 0).expect("search").is_empty());
}
