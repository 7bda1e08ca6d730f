use tantivy::schema::{
    IndexRecordOption, NumericOptions, Schema, TextFieldIndexing, TextOptions, STORED, STRING,
};
use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, StopWordFilter, TextAnalyzer};
use tantivy::Index;

pub const TOKENIZER_NAME: &str = "docshelf_text";

/// Index schema: a fast u64 id (used for delete-by-term and tie-breaks)
/// plus the searchable text fields and the stored path.
pub fn build_schema() -> Schema {
    let mut schema_builder = Schema::builder();
    let id_options = NumericOptions::default().set_indexed().set_stored().set_fast();
    let _id_field = schema_builder.add_u64_field("id", id_options);
    let text_field_indexing = TextFieldIndexing::default()
        .set_tokenizer(TOKENIZER_NAME)
        .set_index_option(IndexRecordOption::WithFreqsAndPositions);
    // Stored as well as indexed: rename rewrites the document from its
    // stored fields without re-extraction.
    let text_options = TextOptions::default().set_indexing_options(text_field_indexing).set_stored();
    let _text_field = schema_builder.add_text_field("text", text_options.clone());
    let _tags_field = schema_builder.add_text_field("tags", text_options.clone());
    let _caption_field = schema_builder.add_text_field("caption", text_options);
    let _path_field = schema_builder.add_text_field("path", STRING | STORED);
    schema_builder.build()
}

/// Case-folding analyzer with an English stopword filter. Tokenization must
/// stay stable across releases: the same text always yields the same token
/// sequence, otherwise re-indexing unchanged content would churn postings.
pub fn register_tokenizer(index: &Index) {
    let stop_words = vec![
        "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "he", "in", "is",
        "it", "its", "of", "on", "that", "the", "to", "was", "will", "with", "or", "but", "not",
        "this", "these", "they", "them", "their", "there", "then", "than", "so", "if", "when",
        "where", "why", "how", "what", "which", "who", "whom", "whose", "can", "could", "should",
        "would", "may", "might", "must", "shall", "do", "does", "did", "have", "had", "having",
    ];
    let tokenizer = TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(LowerCaser)
        .filter(StopWordFilter::remove(stop_words.into_iter().map(|s| s.to_string())))
        .build();
    index.tokenizers().register(TOKENIZER_NAME, tokenizer);
}
