use tantivy::schema::{
    IndexRecordOption, Schema, TextFieldIndexing, TextOptions, STORED, STRING,
};
use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, TextAnalyzer};
use tantivy::Index;

pub const CHUNK_TOKENIZER: &str = "chunk_text";

pub fn build_schema() -> Schema {
    let mut schema_builder = Schema::builder();
    let _id_field = schema_builder.add_text_field("id", STRING | STORED);
    let _section_field = schema_builder.add_text_field("source_section", STRING | STORED);
    let text_field_indexing = TextFieldIndexing::default()
        .set_tokenizer(CHUNK_TOKENIZER)
        .set_index_option(IndexRecordOption::WithFreqsAndPositions);
    let text_options = TextOptions::default()
        .set_indexing_options(text_field_indexing)
        .set_stored();
    let _text_field = schema_builder.add_text_field("text", text_options);
    schema_builder.build()
}

/// Case-folded, punctuation-split word tokenizer. Registered on every index
/// handle so build-time and query-time analysis stay identical.
pub fn register_tokenizer(index: &Index) {
    let tokenizer = TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(LowerCaser)
        .build();
    index.tokenizers().register(CHUNK_TOKENIZER, tokenizer);
}
