//! DOM-to-record extraction for rendered item pages.
//!
//! Each section of the page is handled by an independent rule. A missing
//! section leaves its fields absent and never affects the other sections.
//! The only hard failure is a page without the identity region, which means
//! the page did not finish rendering.

mod attributes;
mod sections;
mod text;

pub use text::{first_integer, first_number, normalize_decimal_comma};

use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::config::Selectors;
use crate::models::ExtractedItem;

/// Extraction failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExtractError {
    /// The identity region was not found: the page did not render as expected.
    #[error("anchor element not found on {url}")]
    AnchorMissing { url: String },
    #[error("invalid selector for {field}: {message}")]
    InvalidSelector { field: &'static str, message: String },
}

impl ExtractError {
    /// Whether retrying the fetch from scratch may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, ExtractError::AnchorMissing { .. })
    }
}

/// Selectors compiled once per extractor.
#[derive(Debug)]
pub(crate) struct CompiledSelectors {
    pub anchor: Selector,
    pub name: Selector,
    pub producer: Selector,
    pub metadata: Selector,
    pub category: Selector,
    pub appellation_link: Selector,
    pub description: Selector,
    pub sensory: Selector,
    pub production_notes: Selector,
    pub attribute_rows: Selector,
    pub aging_icon: Selector,
    pub awards: Selector,
    pub price: Selector,
    pub heading: Selector,
    pub paragraph: Selector,
    pub list_item: Selector,
    pub nested_list_item: Selector,
    pub link: Selector,
    pub row: Selector,
}

fn compile(field: &'static str, css: &str) -> Result<Selector, ExtractError> {
    Selector::parse(css).map_err(|e| ExtractError::InvalidSelector {
        field,
        message: e.to_string(),
    })
}

impl CompiledSelectors {
    fn new(s: &Selectors) -> Result<Self, ExtractError> {
        Ok(Self {
            anchor: compile("anchor", &s.anchor)?,
            name: compile("name", &s.name)?,
            producer: compile("producer", &s.producer)?,
            metadata: compile("metadata", &s.metadata)?,
            category: compile("category", &s.category)?,
            appellation_link: compile("appellation_link", &s.appellation_link)?,
            description: compile("description", &s.description)?,
            sensory: compile("sensory", &s.sensory)?,
            production_notes: compile("production_notes", &s.production_notes)?,
            attribute_rows: compile("attribute_rows", &s.attribute_rows)?,
            aging_icon: compile("aging_icon", &s.aging_icon)?,
            awards: compile("awards", &s.awards)?,
            price: compile("price", &s.price)?,
            heading: compile("heading", "h2, h3, h4")?,
            paragraph: compile("paragraph", "p")?,
            list_item: compile("list_item", "li")?,
            nested_list_item: compile("nested_list_item", "ul li, ol li")?,
            link: compile("link", "a")?,
            row: compile("row", "tr")?,
        })
    }
}

/// A section rule: reads one block of the page into the item.
type SectionRule = fn(&CompiledSelectors, ElementRef<'_>, ElementRef<'_>, &mut ExtractedItem);

/// Section rules, run in order over every page. Each receives the document
/// root and the identity region.
const SECTION_RULES: &[(&str, SectionRule)] = &[
    ("identity", sections::identity),
    ("metadata", sections::metadata),
    ("description", sections::description),
    ("sensory", sections::sensory_profile),
    ("production_notes", sections::production_notes),
    ("attributes", attributes::attribute_table),
    ("awards", sections::awards),
    ("price", sections::price),
];

/// Extracts item records from rendered HTML.
#[derive(Debug)]
pub struct ItemExtractor {
    selectors: CompiledSelectors,
}

impl ItemExtractor {
    pub fn new(selectors: &Selectors) -> Result<Self, ExtractError> {
        Ok(Self {
            selectors: CompiledSelectors::new(selectors)?,
        })
    }

    /// CSS selector of the identity region, used as the render wait anchor.
    pub fn anchor_selector(selectors: &Selectors) -> &str {
        &selectors.anchor
    }

    /// Extract a record from a rendered document.
    pub fn extract(&self, url: &str, html: &str) -> Result<ExtractedItem, ExtractError> {
        let document = Html::parse_document(html);
        let root = document.root_element();

        let anchor = root
            .select(&self.selectors.anchor)
            .next()
            .ok_or_else(|| ExtractError::AnchorMissing {
                url: url.to_string(),
            })?;

        let mut item = ExtractedItem::new(url);
        for (section, rule) in SECTION_RULES {
            rule(&self.selectors, root, anchor, &mut item);
            debug!(url, section, "section extracted");
        }

        Ok(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AttributeKey, AttributeValue, SensoryAspect};

    fn extractor() -> ItemExtractor {
        ItemExtractor::new(&Selectors::default()).unwrap()
    }

    const URL: &str = "https://www.vinetur.com/vinos/vina-ardanza/";

    const FULL_PAGE: &str = r#"
        <html><body>
          <div class="product-info">
            <h1> Viña Ardanza Reserva </h1>
            <h2>La Rioja Alta</h2>
          </div>
          <div class="product-meta">
            <span class="category">Tinto reserva</span>
            <a href="/do/rioja">D.O.Ca. Rioja</a>
          </div>
          <div class="product-description">
            <h3>Un clásico</h3>
            <p>Elegante y   equilibrado.</p>
          </div>
          <div class="tasting-notes">
            <h4>Cata Visual</h4>
            <p>Rojo picota.</p>
            <h4>Cata Olfativa</h4>
            <span>decor</span>
            <p>Frutos rojos maduros.</p>
            <h4>Cata Gustativa</h4>
            <h4>Maridaje</h4>
            <p>Carnes rojas.</p>
          </div>
          <div class="vinification">
            <p>Vendimia manual.</p>
            <p>Fermentación en depósito.</p>
          </div>
          <table class="wine-info">
            <tr><th>D.O.</th><td><a href="/do/rioja">Rioja</a></td></tr>
            <tr><th>Ubicación</th><td>Haro, La Rioja</td></tr>
            <tr><th>Variedades</th><td><ul><li>Tempranillo</li><li>Garnacha</li><li>Tempranillo</li></ul></td></tr>
            <tr><th>Crianza</th><td><i class="icon-check"></i></td></tr>
            <tr><th>Barrica</th><td>Tiempo: 36 meses<ul><li>Roble americano</li><li>Roble francés</li></ul></td></tr>
            <tr><th>Grado alcohólico</th><td>14.5%</td></tr>
            <tr><th>Temperatura de servicio</th><td>16-18 ºC</td></tr>
            <tr><th>Botella</th><td>75 cl</td></tr>
            <tr><th>Color del año</th><td>Granate</td></tr>
            <tr><th>Sin valor</th></tr>
          </table>
          <div class="awards">
            <table>
              <tr><td>Decanter 2020</td><td>95 puntos</td></tr>
              <tr><td>Peñín 2021</td><td>93 puntos</td></tr>
            </table>
          </div>
          <span class="price">29,90 €</span>
        </body></html>
    "#;

    #[test]
    fn extracts_every_section_of_a_full_page() {
        let item = extractor().extract(URL, FULL_PAGE).unwrap();

        assert_eq!(item.url, URL);
        assert_eq!(item.name.as_deref(), Some("Viña Ardanza Reserva"));
        assert_eq!(item.producer.as_deref(), Some("La Rioja Alta"));
        assert_eq!(item.category.as_deref(), Some("Tinto reserva"));
        assert_eq!(item.appellation.as_deref(), Some("D.O.Ca. Rioja"));
        assert_eq!(
            item.description.as_deref(),
            Some("Un clásico Elegante y equilibrado.")
        );
        assert_eq!(
            item.production_notes.as_deref(),
            Some("Vendimia manual. Fermentación en depósito.")
        );
        assert_eq!(item.price, Some(29.9));

        assert_eq!(
            item.sensory_profile.get(&SensoryAspect::Visual).map(String::as_str),
            Some("Rojo picota.")
        );
        assert_eq!(
            item.sensory_profile.get(&SensoryAspect::Olfactory).map(String::as_str),
            Some("Frutos rojos maduros.")
        );
        assert!(!item.sensory_profile.contains_key(&SensoryAspect::Gustatory));
        assert_eq!(
            item.sensory_profile.get(&SensoryAspect::Pairing).map(String::as_str),
            Some("Carnes rojas.")
        );

        let attrs = &item.attributes;
        assert_eq!(
            attrs.get(&AttributeKey::Appellation),
            Some(&AttributeValue::Text("Rioja".into()))
        );
        assert_eq!(item.location(), Some("Haro, La Rioja"));
        assert_eq!(
            attrs.get(&AttributeKey::VarietyTable),
            Some(&AttributeValue::List(vec![
                "Tempranillo".into(),
                "Garnacha".into(),
                "Tempranillo".into()
            ]))
        );
        assert_eq!(attrs.get(&AttributeKey::Aged), Some(&AttributeValue::Flag(true)));
        assert_eq!(
            attrs.get(&AttributeKey::BarrelMonths),
            Some(&AttributeValue::Integer(36))
        );
        assert_eq!(
            attrs.get(&AttributeKey::BarrelType),
            Some(&AttributeValue::Text("Roble americano".into()))
        );
        assert_eq!(
            attrs.get(&AttributeKey::AlcoholGrade),
            Some(&AttributeValue::Float(14.5))
        );
        assert_eq!(
            attrs.get(&AttributeKey::ServingTemperature),
            Some(&AttributeValue::Float(16.0))
        );
        assert_eq!(
            attrs.get(&AttributeKey::BottleSize),
            Some(&AttributeValue::Float(75.0))
        );
        assert!(!attrs.contains_key(&AttributeKey::Coordinates));
        assert_eq!(attrs.len(), 9);

        assert_eq!(item.awards.rows.len(), 2);
        assert_eq!(item.awards.rows["Decanter 2020"], "95 puntos");
        assert!(item.awards.summary.is_none());
    }

    #[test]
    fn page_without_optional_sections_yields_url_only() {
        let html = r#"<html><body><div class="product-info"></div></body></html>"#;
        let item = extractor().extract(URL, html).unwrap();
        assert_eq!(item, ExtractedItem::new(URL));
    }

    #[test]
    fn missing_anchor_is_a_transient_error() {
        let html = "<html><body><h1>Loading…</h1></body></html>";
        let err = extractor().extract(URL, html).unwrap_err();
        assert_eq!(
            err,
            ExtractError::AnchorMissing {
                url: URL.to_string()
            }
        );
        assert!(err.is_transient());
    }

    #[test]
    fn invalid_selector_is_reported_by_field() {
        let selectors = Selectors {
            price: "[[".into(),
            ..Default::default()
        };
        let err = ItemExtractor::new(&selectors).unwrap_err();
        assert!(matches!(err, ExtractError::InvalidSelector { field: "price", .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn unavailable_alcohol_grade_is_absent() {
        let html = r#"
            <div class="product-info"><h1>X</h1></div>
            <table class="wine-info">
              <tr><th>Grado alcohólico</th><td>N/D</td></tr>
            </table>
        "#;
        let item = extractor().extract(URL, html).unwrap();
        assert!(!item.attributes.contains_key(&AttributeKey::AlcoholGrade));
    }
}
