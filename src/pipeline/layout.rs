//! PDF page layout derived from an SVG root element.
//!
//! The page is sized to the drawing's declared pixel dimensions so the PDF
//! is a one-page, edge-to-edge copy of the SVG. Resolution per axis:
//!
//! 1. the root `width` / `height` attribute (leading number, units ignored)
//! 2. the third / fourth `viewBox` component
//! 3. [`DEFAULT_PAGE_WIDTH`] × [`DEFAULT_PAGE_HEIGHT`]
//!
//! Non-positive or unparsable values are skipped. The result depends only
//! on the markup, so the same SVG always yields the same page.

use crate::error::SvgrError;
use once_cell::sync::Lazy;
use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::io::Cursor;

pub const DEFAULT_PAGE_WIDTH: f64 = 800.0;
pub const DEFAULT_PAGE_HEIGHT: f64 = 600.0;

static LEADING_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?)").expect("valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Orientation {
    Landscape,
    Portrait,
}

/// Page size in pixels (= PDF points) plus orientation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageLayout {
    pub width: f64,
    pub height: f64,
    pub orientation: Orientation,
}

impl PageLayout {
    pub fn new(width: f64, height: f64) -> Self {
        let orientation = if width >= height {
            Orientation::Landscape
        } else {
            Orientation::Portrait
        };
        Self {
            width,
            height,
            orientation,
        }
    }
}

/// The sizing attributes found on the root `<svg>`.
#[derive(Debug, Default, Clone, PartialEq)]
struct RootSizing {
    width: Option<f64>,
    height: Option<f64>,
    view_box: Option<(f64, f64)>,
}

/// Derive the page layout for `svg`.
///
/// Fails only when the markup has no `<svg>` element before a parse error
/// or end of input.
pub fn derive_layout(svg: &str) -> Result<PageLayout, SvgrError> {
    let sizing = read_root_sizing(svg)?;
    let width = sizing
        .width
        .or(sizing.view_box.map(|(w, _)| w))
        .unwrap_or(DEFAULT_PAGE_WIDTH);
    let height = sizing
        .height
        .or(sizing.view_box.map(|(_, h)| h))
        .unwrap_or(DEFAULT_PAGE_HEIGHT);
    Ok(PageLayout::new(width, height))
}

fn read_root_sizing(svg: &str) -> Result<RootSizing, SvgrError> {
    let mut reader = Reader::from_str(svg);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if is_svg_root(&e) => {
                return Ok(sizing_of(&e));
            }
            Ok(Event::Eof) => {
                return Err(SvgrError::InvalidSvg {
                    detail: "no <svg> root element".into(),
                })
            }
            Ok(_) => {}
            Err(e) => {
                return Err(SvgrError::InvalidSvg {
                    detail: format!(
                        "XML parse error at position {}: {}",
                        reader.error_position(),
                        e
                    ),
                })
            }
        }
    }
}

fn is_svg_root(e: &BytesStart<'_>) -> bool {
    e.local_name().as_ref() == b"svg"
}

fn sizing_of(e: &BytesStart<'_>) -> RootSizing {
    let mut sizing = RootSizing::default();
    for attr in e.attributes().with_checks(false).flatten() {
        let value = String::from_utf8_lossy(&attr.value);
        match attr.key.local_name().as_ref() {
            b"width" => sizing.width = parse_length(&value),
            b"height" => sizing.height = parse_length(&value),
            b"viewBox" => sizing.view_box = parse_view_box(&value),
            _ => {}
        }
    }
    sizing
}

/// Leading number of an SVG length (`"200"`, `"200px"`, `"12.5mm"`).
/// Only finite, strictly positive values count. Percentages are relative to
/// a viewport the document does not have, so they count as absent.
pub fn parse_length(value: &str) -> Option<f64> {
    let caps = LEADING_NUMBER.captures(value)?;
    let number = caps.get(1)?;
    if value[number.end()..].trim_start().starts_with('%') {
        return None;
    }
    let n: f64 = number.as_str().parse().ok()?;
    (n.is_finite() && n > 0.0).then_some(n)
}

/// Width and height of a `viewBox="min-x min-y width height"` value.
pub fn parse_view_box(value: &str) -> Option<(f64, f64)> {
    let parts: Vec<f64> = value
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect::<Result<_, _>>()
        .ok()?;
    if parts.len() != 4 {
        return None;
    }
    let (w, h) = (parts[2], parts[3]);
    (w.is_finite() && h.is_finite() && w > 0.0 && h > 0.0).then_some((w, h))
}

/// Rewrite the root element's `width`/`height` to the page size.
///
/// Everything else passes through untouched, so a `viewBox` keeps mapping
/// the drawing onto the now page-sized viewport.
pub fn fit_to_page(svg: &str, layout: &PageLayout) -> Result<String, SvgrError> {
    let mut reader = Reader::from_str(svg);
    let mut writer = Writer::new(Cursor::new(Vec::with_capacity(svg.len() + 64)));
    let mut rewritten = false;

    let invalid = |detail: String| SvgrError::InvalidSvg { detail };

    loop {
        let event = match reader.read_event() {
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) if !rewritten && is_svg_root(&e) => {
                rewritten = true;
                Event::Start(sized_root(&e, layout))
            }
            Ok(Event::Empty(e)) if !rewritten && is_svg_root(&e) => {
                rewritten = true;
                Event::Empty(sized_root(&e, layout))
            }
            Ok(event) => event,
            Err(e) => {
                return Err(invalid(format!(
                    "XML parse error at position {}: {}",
                    reader.error_position(),
                    e
                )))
            }
        };
        writer
            .write_event(event)
            .map_err(|e| invalid(format!("rewrite failed: {e}")))?;
    }

    if !rewritten {
        return Err(invalid("no <svg> root element".into()));
    }

    String::from_utf8(writer.into_inner().into_inner())
        .map_err(|e| invalid(format!("rewritten SVG is not UTF-8: {e}")))
}

fn sized_root(e: &BytesStart<'_>, layout: &PageLayout) -> BytesStart<'static> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut root = BytesStart::new(name);
    for attr in e.attributes().with_checks(false).flatten() {
        let key = attr.key.local_name();
        if attr.key.prefix().is_none() && (key.as_ref() == b"width" || key.as_ref() == b"height") {
            continue;
        }
        root.push_attribute((attr.key.as_ref(), attr.value.as_ref()));
    }
    let width = format_number(layout.width);
    let height = format_number(layout.height);
    root.push_attribute(("width", width.as_str()));
    root.push_attribute(("height", height.as_str()));
    root
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_width_height_landscape() {
        let layout = derive_layout(r#"<svg width="200" height="100">"#).unwrap();
        assert_eq!((layout.width, layout.height), (200.0, 100.0));
        assert_eq!(layout.orientation, Orientation::Landscape);
    }

    #[test]
    fn view_box_only_portrait() {
        let layout = derive_layout(
            r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 100 400"></svg>"#,
        )
        .unwrap();
        assert_eq!((layout.width, layout.height), (100.0, 400.0));
        assert_eq!(layout.orientation, Orientation::Portrait);
    }

    #[test]
    fn neither_defaults_to_800_by_600() {
        let layout = derive_layout(r#"<svg xmlns="http://www.w3.org/2000/svg"/>"#).unwrap();
        assert_eq!((layout.width, layout.height), (800.0, 600.0));
        assert_eq!(layout.orientation, Orientation::Landscape);
    }

    #[test]
    fn square_is_landscape() {
        assert_eq!(PageLayout::new(50.0, 50.0).orientation, Orientation::Landscape);
    }

    #[test]
    fn attributes_win_over_view_box() {
        let layout =
            derive_layout(r#"<svg width="300px" height="150px" viewBox="0 0 10 20"/>"#).unwrap();
        assert_eq!((layout.width, layout.height), (300.0, 150.0));
    }

    #[test]
    fn each_axis_falls_back_independently() {
        let layout = derive_layout(r#"<svg width="120" viewBox="0,0,10,90"/>"#).unwrap();
        assert_eq!((layout.width, layout.height), (120.0, 90.0));
    }

    #[test]
    fn percentage_size_falls_back_to_view_box() {
        let svg = r#"<svg width="100%" height="100%" viewBox="0 0 300 200"/>"#;
        let layout = derive_layout(svg).unwrap();
        assert_eq!((layout.width, layout.height), (300.0, 200.0));
        assert_eq!(layout.orientation, Orientation::Landscape);

        let layout = derive_layout(r#"<svg width="100%" height="40"/>"#).unwrap();
        assert_eq!((layout.width, layout.height), (800.0, 40.0));
    }

    #[test]
    fn declaration_and_comments_are_skipped() {
        let svg = "<?xml version=\"1.0\"?>\n<!-- generated -->\n<svg width=\"10\" height=\"30\"/>";
        let layout = derive_layout(svg).unwrap();
        assert_eq!(layout.orientation, Orientation::Portrait);
    }

    #[test]
    fn derivation_is_deterministic() {
        let svg = r#"<svg viewBox="0 0 640 480"><rect width="1" height="1"/></svg>"#;
        assert_eq!(derive_layout(svg).unwrap(), derive_layout(svg).unwrap());
    }

    #[test]
    fn no_svg_element_is_invalid() {
        assert!(matches!(
            derive_layout("<html></html>"),
            Err(SvgrError::InvalidSvg { .. })
        ));
        assert!(matches!(derive_layout(""), Err(SvgrError::InvalidSvg { .. })));
    }

    #[test]
    fn parse_length_rules() {
        assert_eq!(parse_length("200"), Some(200.0));
        assert_eq!(parse_length(" 12.5mm"), Some(12.5));
        assert_eq!(parse_length("1e2"), Some(100.0));
        assert_eq!(parse_length("0"), None);
        assert_eq!(parse_length("-5"), None);
        assert_eq!(parse_length("auto"), None);
        assert_eq!(parse_length("100%"), None);
        assert_eq!(parse_length("50 %"), None);
    }

    #[test]
    fn parse_view_box_rules() {
        assert_eq!(parse_view_box("0 0 100 400"), Some((100.0, 400.0)));
        assert_eq!(parse_view_box("0, 0, 3, 4"), Some((3.0, 4.0)));
        assert_eq!(parse_view_box("0 0 100"), None);
        assert_eq!(parse_view_box("0 0 0 10"), None);
        assert_eq!(parse_view_box("a b c d"), None);
    }

    #[test]
    fn fit_to_page_replaces_root_size_only() {
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 100 400" width="1"><rect width="5" height="5"/></svg>"#;
        let layout = PageLayout::new(100.0, 400.0);
        let out = fit_to_page(svg, &layout).unwrap();

        assert!(out.contains(r#"viewBox="0 0 100 400""#), "{out}");
        assert!(out.contains(r#"width="100""#), "{out}");
        assert!(out.contains(r#"height="400""#), "{out}");
        assert!(!out.contains(r#"width="1""#), "{out}");
        assert!(out.contains(r#"<rect width="5" height="5"/>"#), "{out}");
        assert_eq!(derive_layout(&out).unwrap(), layout);
    }

    #[test]
    fn fit_to_page_without_root_fails() {
        let layout = PageLayout::new(1.0, 1.0);
        assert!(fit_to_page("<g/>", &layout).is_err());
    }
}
