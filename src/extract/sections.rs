//! Section rules for the descriptive blocks of an item page.

use scraper::ElementRef;

use super::text::{first_number, is_heading, join_fragments, normalize_decimal_comma, text_of};
use super::CompiledSelectors;
use crate::models::{ExtractedItem, SensoryAspect};

/// Name from the first header of the identity region, producer from the
/// secondary header right after it.
pub(super) fn identity(
    sel: &CompiledSelectors,
    _root: ElementRef<'_>,
    anchor: ElementRef<'_>,
    item: &mut ExtractedItem,
) {
    let Some(header) = anchor.select(&sel.name).next() else {
        // No header at all: fall back to any secondary header in the region.
        item.producer = anchor.select(&sel.producer).next().and_then(text_of);
        return;
    };
    item.name = text_of(header);

    let adjacent = header
        .next_siblings()
        .filter_map(ElementRef::wrap)
        .next()
        .filter(|el| matches!(el.value().name(), "h2" | "h3" | "h4"));

    item.producer = adjacent
        .and_then(text_of)
        .or_else(|| anchor.select(&sel.producer).next().and_then(text_of));
}

pub(super) fn metadata(
    sel: &CompiledSelectors,
    root: ElementRef<'_>,
    _anchor: ElementRef<'_>,
    item: &mut ExtractedItem,
) {
    let Some(block) = root.select(&sel.metadata).next() else {
        return;
    };
    item.category = block.select(&sel.category).next().and_then(text_of);
    item.appellation = block.select(&sel.appellation_link).next().and_then(text_of);
}

pub(super) fn description(
    sel: &CompiledSelectors,
    root: ElementRef<'_>,
    _anchor: ElementRef<'_>,
    item: &mut ExtractedItem,
) {
    let Some(block) = root.select(&sel.description).next() else {
        return;
    };
    let heading = block.select(&sel.heading).next().and_then(text_of);
    let paragraph = block.select(&sel.paragraph).next().and_then(text_of);
    item.description = join_fragments([heading, paragraph]);
}

/// Single pass over the block's direct children.
///
/// A heading naming a known aspect sets the cursor, the next paragraph
/// commits the text for that aspect and clears it. Headings that name no
/// aspect clear the cursor; any other element leaves it untouched.
pub(super) fn sensory_profile(
    sel: &CompiledSelectors,
    root: ElementRef<'_>,
    _anchor: ElementRef<'_>,
    item: &mut ExtractedItem,
) {
    let Some(block) = root.select(&sel.sensory).next() else {
        return;
    };

    let mut cursor: Option<SensoryAspect> = None;
    for child in block.children().filter_map(ElementRef::wrap) {
        let tag = child.value().name();
        if is_heading(tag) {
            cursor = text_of(child).and_then(|t| SensoryAspect::from_heading(&t));
        } else if tag == "p" {
            if let Some(aspect) = cursor.take() {
                if let Some(text) = text_of(child) {
                    item.sensory_profile.insert(aspect, text);
                }
            }
        }
    }
}

pub(super) fn production_notes(
    sel: &CompiledSelectors,
    root: ElementRef<'_>,
    _anchor: ElementRef<'_>,
    item: &mut ExtractedItem,
) {
    let Some(block) = root.select(&sel.production_notes).next() else {
        return;
    };
    item.production_notes = join_fragments(block.select(&sel.paragraph).map(text_of));
}

/// Award rows (label cell, value cell); a block without rows keeps its
/// paragraph text as a single summary.
pub(super) fn awards(
    sel: &CompiledSelectors,
    root: ElementRef<'_>,
    _anchor: ElementRef<'_>,
    item: &mut ExtractedItem,
) {
    let Some(block) = root.select(&sel.awards).next() else {
        return;
    };

    for row in block.select(&sel.row) {
        let mut cells = row
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|c| matches!(c.value().name(), "th" | "td"));
        let (Some(label), Some(value)) = (cells.next(), cells.next()) else {
            continue;
        };
        if let (Some(label), Some(value)) = (text_of(label), text_of(value)) {
            item.awards.rows.insert(label, value);
        }
    }

    if item.awards.rows.is_empty() {
        item.awards.summary = join_fragments(block.select(&sel.paragraph).map(text_of));
    }
}

pub(super) fn price(
    sel: &CompiledSelectors,
    root: ElementRef<'_>,
    _anchor: ElementRef<'_>,
    item: &mut ExtractedItem,
) {
    item.price = root
        .select(&sel.price)
        .next()
        .and_then(text_of)
        .and_then(|t| first_number(&normalize_decimal_comma(&t)))
        .filter(|p| *p >= 0.0);
}
