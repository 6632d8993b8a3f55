//! The content-model capability layer. Engines parse a row into a
//! `Description`, serialize it to a `Graph`, and validate it, all driven by
//! a static `ModelDef` — the engines never know any model's concrete shape.

mod description;
mod header_map;
mod model;
mod registry;
mod validation;
mod vocabulary;

pub use description::{Description, EmbeddedDescription, LiteralValue, PropertyValue};
pub use header_map::HeaderMap;
pub use model::{
    no_vocabulary_fetcher, DecoratedValue, EmbeddedIndex, ModelDef, Property, PropertyKind, RowFields,
};
pub use registry::{ModelNotFoundError, ModelRegistry};
pub use validation::{ValidationResult, ValidationResults};
pub use vocabulary::{UnreachableVocabularyFetcher, VocabularyCache, VocabularyFetcher};
