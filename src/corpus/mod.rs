pub mod index;
pub mod normalize;
pub mod preprocess;

pub use index::{load_index, IndexEntry, INDEX_FILE};
pub use normalize::{canonical_cms_label, normalize_name, normalize_value, EMPTY_VALUE};
pub use preprocess::{
    preprocess_corpus, FilterReason, FilteringStats, PreprocessMetadata, PreprocessedData,
    SiteData, ValueSets,
};
