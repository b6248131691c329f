use fontdb::{Database, Family, Query, Stretch, Style, Weight};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use ttf_parser::Face;

static TEXT_MEASURER: Lazy<Mutex<TextMeasurer>> = Lazy::new(|| Mutex::new(TextMeasurer::new()));

/// How entity sizes are derived for layout input and placeholder geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizingConfig {
    pub font_family: String,
    pub font_size: f32,
    pub padding_x: f32,
    pub padding_y: f32,
    pub min_width: f32,
    pub min_height: f32,
    pub max_width: f32,
    pub line_height: f32,
    pub group_min_width: f32,
    pub group_min_height: f32,
    /// Offset between successive placeholder positions inside one parent.
    pub cascade_offset: f32,
    /// Measure with installed fonts; otherwise use the average-width estimate.
    pub system_fonts: bool,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            font_family: "Inter, Segoe UI, system-ui, -apple-system, sans-serif".to_string(),
            font_size: 13.0,
            padding_x: 16.0,
            padding_y: 12.0,
            min_width: 120.0,
            min_height: 48.0,
            max_width: 280.0,
            line_height: 1.5,
            group_min_width: 240.0,
            group_min_height: 120.0,
            cascade_offset: 24.0,
            system_fonts: true,
        }
    }
}

impl SizingConfig {
    pub fn text_width(&self, text: &str) -> f32 {
        if self.system_fonts
            && let Some(width) = measure_text_width(text, self.font_size, &self.font_family)
        {
            return width;
        }
        estimate_text_width(text, self.font_size)
    }

    /// Box size for a leaf showing `label`; long labels wrap at `max_width`.
    pub fn leaf_size(&self, label: &str) -> (f32, f32) {
        let text = self.text_width(label.trim());
        let inner_max = (self.max_width - self.padding_x * 2.0).max(1.0);
        let lines = (text / inner_max).ceil().max(1.0);
        let width = (text.min(inner_max) + self.padding_x * 2.0)
            .max(self.min_width)
            .min(self.max_width.max(self.min_width));
        let height = (lines * self.font_size * self.line_height + self.padding_y * 2.0)
            .max(self.min_height);
        (width, height)
    }

    pub fn group_size(&self) -> (f32, f32) {
        (self.group_min_width, self.group_min_height)
    }
}

pub fn estimate_text_width(text: &str, font_size: f32) -> f32 {
    text.chars().filter(|ch| *ch != '\n').count() as f32 * font_size * 0.56
}

pub fn measure_text_width(text: &str, font_size: f32, font_family: &str) -> Option<f32> {
    if text.is_empty() || font_size <= 0.0 {
        return Some(0.0);
    }
    let mut guard = TEXT_MEASURER.lock().ok()?;
    guard.measure(text, font_size, font_family)
}

struct TextMeasurer {
    db: Database,
    loaded_system_fonts: bool,
    faces: HashMap<String, Option<FontFace>>,
}

impl TextMeasurer {
    fn new() -> Self {
        Self {
            db: Database::new(),
            loaded_system_fonts: false,
            faces: HashMap::new(),
        }
    }

    fn measure(&mut self, text: &str, font_size: f32, font_family: &str) -> Option<f32> {
        let key = normalize_family_key(font_family);
        if !self.faces.contains_key(&key) {
            let face = self.load_face(font_family);
            if face.is_none() {
                tracing::debug!(family = %key, "no installed font matched; estimating widths");
            }
            self.faces.insert(key.clone(), face);
        }
        let face = self.faces.get_mut(&key)?.as_mut()?;
        face.measure_width(&text.replace('\t', "    "), font_size)
    }

    fn load_face(&mut self, font_family: &str) -> Option<FontFace> {
        let names: Vec<String> = font_family
            .split(',')
            .map(|part| part.trim().trim_matches('"').trim_matches('\'').to_string())
            .filter(|part| !part.is_empty())
            .collect();
        let mut families: Vec<Family<'_>> = names
            .iter()
            .map(|name| match name.to_ascii_lowercase().as_str() {
                "serif" => Family::Serif,
                "monospace" | "ui-monospace" => Family::Monospace,
                "sans-serif" | "system-ui" | "-apple-system" | "ui-sans-serif" => Family::SansSerif,
                _ => Family::Name(name.as_str()),
            })
            .collect();
        if families.is_empty() {
            families.push(Family::SansSerif);
        }

        if !self.loaded_system_fonts {
            self.db.load_system_fonts();
            self.loaded_system_fonts = true;
        }

        let query = Query {
            families: &families,
            weight: Weight::NORMAL,
            stretch: Stretch::Normal,
            style: Style::Normal,
        };
        let id = self.db.query(&query)?;
        self.db
            .with_face_data(id, |data, index| FontFace::parse(data.to_vec(), index))
            .flatten()
    }
}

struct FontFace {
    data: Vec<u8>,
    index: u32,
    units_per_em: u16,
    advances: HashMap<char, Option<u16>>,
}

impl FontFace {
    fn parse(data: Vec<u8>, index: u32) -> Option<Self> {
        let units_per_em = Face::parse(&data, index).ok()?.units_per_em().max(1);
        Some(Self {
            data,
            index,
            units_per_em,
            advances: HashMap::new(),
        })
    }

    fn measure_width(&mut self, text: &str, font_size: f32) -> Option<f32> {
        let scale = font_size / self.units_per_em as f32;
        let fallback = font_size * 0.56;
        let mut face: Option<Face<'_>> = None;
        let mut width = 0.0f32;

        for ch in text.chars() {
            if ch == '\n' {
                continue;
            }
            let advance = match self.advances.get(&ch) {
                Some(cached) => *cached,
                None => {
                    if face.is_none() {
                        face = Some(Face::parse(&self.data, self.index).ok()?);
                    }
                    let parsed = face.as_ref()?;
                    let value = parsed
                        .glyph_index(ch)
                        .and_then(|glyph| parsed.glyph_hor_advance(glyph));
                    self.advances.insert(ch, value);
                    value
                }
            };
            width += match advance {
                Some(units) if units > 0 => units as f32 * scale,
                _ => fallback,
            };
        }

        Some(width.max(0.0))
    }
}

fn normalize_family_key(font_family: &str) -> String {
    let trimmed = font_family.trim();
    if trimmed.is_empty() {
        "sans-serif".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimated() -> SizingConfig {
        SizingConfig {
            system_fonts: false,
            ..Default::default()
        }
    }

    #[test]
    fn short_labels_get_minimum_size() {
        let config = estimated();
        assert_eq!(config.leaf_size("db"), (config.min_width, config.min_height));
    }

    #[test]
    fn long_labels_wrap_instead_of_growing_forever() {
        let config = estimated();
        let (width, height) = config.leaf_size(&"very long service name ".repeat(6));
        assert!(width <= config.max_width);
        assert!(height > config.min_height);
    }

    #[test]
    fn estimate_ignores_newlines() {
        assert_eq!(estimate_text_width("ab\ncd", 10.0), estimate_text_width("abcd", 10.0));
    }
}
