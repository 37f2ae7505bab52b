//! Domain models.

mod item;

pub use item::{
    AttributeKey, AttributeValue, Attributes, Awards, Coordinates, ExtractedItem, ItemRecord,
    SensoryAspect,
};
