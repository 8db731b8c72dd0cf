//! Opaque inline style storage.
//!
//! The document never interprets property values; it only keeps them ordered
//! so the style engine can serialize them deterministically.

use smallvec::SmallVec;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Style {
    properties: SmallVec<(String, String), 4>,
}

fn normalize_name(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

impl Style {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `a: b; c: d`. Declarations without a colon are ignored.
    pub fn parse(css_text: &str) -> Self {
        let mut style = Self::new();
        style.set_css_text(css_text);
        style
    }

    /// Set a property, returning the previous value. Setting an empty value
    /// removes the property.
    pub fn set_property(&mut self, name: &str, value: &str) -> Option<String> {
        let value = value.trim();
        if value.is_empty() {
            return self.remove_property(name);
        }
        let name = normalize_name(name);
        if let Some(slot) = self.properties.iter_mut().find(|(existing, _)| *existing == name) {
            return Some(core::mem::replace(&mut slot.1, value.to_owned()));
        }
        self.properties.push((name, value.to_owned()));
        None
    }

    pub fn remove_property(&mut self, name: &str) -> Option<String> {
        let name = normalize_name(name);
        let position = self.properties.iter().position(|(existing, _)| *existing == name)?;
        Some(self.properties.remove(position).1)
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        let name = normalize_name(name);
        self.properties
            .iter()
            .find(|(existing, _)| *existing == name)
            .map(|(_, value)| value.as_str())
    }

    /// Replace every property with the declarations in `css_text`.
    pub fn set_css_text(&mut self, css_text: &str) {
        self.properties.clear();
        for declaration in css_text.split(';') {
            if let Some((name, value)) = declaration.split_once(':') {
                if !name.trim().is_empty() {
                    self.set_property(name, value);
                }
            }
        }
    }

    /// Serialize as `a: b; c: d` in insertion order.
    pub fn css_text(&self) -> String {
        self.properties
            .iter()
            .map(|(name, value)| format!("{name}: {value}"))
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.properties
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn css_text_round_trips_in_insertion_order() {
        let style = Style::parse(" Color: red ;margin:0; bogus ; ;width: 10px");
        assert_eq!(style.css_text(), "color: red; margin: 0; width: 10px");
        assert_eq!(style.property("COLOR"), Some("red"));
    }

    #[test]
    fn empty_value_removes_property() {
        let mut style = Style::parse("color: red");
        assert_eq!(style.set_property("color", ""), Some("red".to_owned()));
        assert!(style.is_empty());
    }
}
