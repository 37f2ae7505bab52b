//! Info-table dispatch.
//!
//! Row labels are lowercased and matched by substring against an ordered
//! rule list; the first rule whose needle occurs in the label handles the
//! row. Rows with unknown labels are dropped.

use scraper::ElementRef;

use super::text::{first_integer, first_number, normalize_whitespace, text_of};
use super::CompiledSelectors;
use crate::models::{AttributeKey, AttributeValue, Attributes, ExtractedItem};

type ApplyFn = fn(&CompiledSelectors, ElementRef<'_>, &mut Attributes);

struct AttributeRule {
    needles: &'static [&'static str],
    apply: ApplyFn,
}

const ATTRIBUTE_RULES: &[AttributeRule] = &[
    AttributeRule {
        needles: &["d.o.", "igp", "denominaci"],
        apply: appellation,
    },
    AttributeRule {
        needles: &["ubicaci", "zona", "regi"],
        apply: location,
    },
    AttributeRule {
        needles: &["variedad", "uva"],
        apply: varieties,
    },
    AttributeRule {
        needles: &["crianza"],
        apply: aging_flag,
    },
    AttributeRule {
        needles: &["barrica"],
        apply: barrel,
    },
    AttributeRule {
        needles: &["grado", "alcohol"],
        apply: alcohol_grade,
    },
    AttributeRule {
        needles: &["temperatura"],
        apply: serving_temperature,
    },
    AttributeRule {
        needles: &["botella", "tamaño", "formato"],
        apply: bottle_size,
    },
];

fn rule_for(label: &str) -> Option<&'static AttributeRule> {
    ATTRIBUTE_RULES
        .iter()
        .find(|rule| rule.needles.iter().any(|n| label.contains(n)))
}

pub(super) fn attribute_table(
    sel: &CompiledSelectors,
    root: ElementRef<'_>,
    _anchor: ElementRef<'_>,
    item: &mut ExtractedItem,
) {
    for row in root.select(&sel.attribute_rows) {
        let mut cells = row
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|c| matches!(c.value().name(), "th" | "td"));
        let (Some(label_cell), Some(value_cell)) = (cells.next(), cells.next()) else {
            continue;
        };
        let Some(label) = text_of(label_cell).map(|l| l.to_lowercase()) else {
            continue;
        };
        if let Some(rule) = rule_for(&label) {
            (rule.apply)(sel, value_cell, &mut item.attributes);
        }
    }
}

fn raw_text(cell: ElementRef<'_>) -> String {
    normalize_whitespace(&cell.text().collect::<String>())
}

fn insert_text(attrs: &mut Attributes, key: AttributeKey, text: Option<String>) {
    if let Some(text) = text {
        attrs.insert(key, AttributeValue::Text(text));
    }
}

fn insert_float(attrs: &mut Attributes, key: AttributeKey, cell: ElementRef<'_>) {
    if let Some(value) = first_number(&raw_text(cell)) {
        attrs.insert(key, AttributeValue::Float(value));
    }
}

fn appellation(sel: &CompiledSelectors, cell: ElementRef<'_>, attrs: &mut Attributes) {
    let text = cell
        .select(&sel.link)
        .next()
        .and_then(text_of)
        .or_else(|| text_of(cell));
    insert_text(attrs, AttributeKey::Appellation, text);
}

fn location(_sel: &CompiledSelectors, cell: ElementRef<'_>, attrs: &mut Attributes) {
    insert_text(attrs, AttributeKey::Location, text_of(cell));
}

/// Ordered list texts; falls back to a comma split of the cell text.
fn varieties(sel: &CompiledSelectors, cell: ElementRef<'_>, attrs: &mut Attributes) {
    let mut list: Vec<String> = cell.select(&sel.list_item).filter_map(text_of).collect();
    if list.is_empty() {
        list = raw_text(cell)
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }
    if !list.is_empty() {
        attrs.insert(AttributeKey::VarietyTable, AttributeValue::List(list));
    }
}

fn aging_flag(sel: &CompiledSelectors, cell: ElementRef<'_>, attrs: &mut Attributes) {
    let present = cell.select(&sel.aging_icon).next().is_some();
    attrs.insert(AttributeKey::Aged, AttributeValue::Flag(present));
}

/// Duration is the first number after "tiempo"; type is the first item of a nested list.
fn barrel(sel: &CompiledSelectors, cell: ElementRef<'_>, attrs: &mut Attributes) {
    let text = raw_text(cell).to_lowercase();
    if let Some(pos) = text.find("tiempo") {
        if let Some(months) = first_integer(&text[pos..]) {
            attrs.insert(AttributeKey::BarrelMonths, AttributeValue::Integer(months));
        }
    }
    let kind = cell.select(&sel.nested_list_item).next().and_then(text_of);
    insert_text(attrs, AttributeKey::BarrelType, kind);
}

fn alcohol_grade(_sel: &CompiledSelectors, cell: ElementRef<'_>, attrs: &mut Attributes) {
    insert_float(attrs, AttributeKey::AlcoholGrade, cell);
}

fn serving_temperature(_sel: &CompiledSelectors, cell: ElementRef<'_>, attrs: &mut Attributes) {
    insert_float(attrs, AttributeKey::ServingTemperature, cell);
}

fn bottle_size(_sel: &CompiledSelectors, cell: ElementRef<'_>, attrs: &mut Attributes) {
    insert_float(attrs, AttributeKey::BottleSize, cell);
}
