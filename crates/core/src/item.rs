//! Items and their per-item overrides.
//!
//! Text, markdown, and audio-link items share number/condition/block
//! metadata and differ only in their content, so content is a tagged
//! variant rather than a subtype hierarchy.

use serde::{Deserialize, Serialize};

use crate::listing::{split_list_string, to_list_string};

/// The kind of stimulus a study presents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ItemType {
    PlainText,
    Markdown,
    AudioLinks,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::PlainText => "plain-text",
            ItemType::Markdown => "markdown",
            ItemType::AudioLinks => "audio-link-list",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "plain-text" => Some(ItemType::PlainText),
            "markdown" => Some(ItemType::Markdown),
            "audio-link-list" => Some(ItemType::AudioLinks),
            _ => None,
        }
    }
}

/// Item content, matching the study's item type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "kebab-case")]
pub enum ItemContent {
    Text(String),
    Markdown(String),
    AudioLinks(Vec<String>),
}

impl ItemContent {
    /// Build content of the right variant from a CSV cell.
    pub fn from_cell(item_type: ItemType, cell: &str) -> Self {
        match item_type {
            ItemType::PlainText => ItemContent::Text(cell.to_string()),
            ItemType::Markdown => ItemContent::Markdown(cell.to_string()),
            ItemType::AudioLinks => ItemContent::AudioLinks(split_list_string(cell)),
        }
    }

    /// The single-string form used on all CSV surfaces.
    pub fn as_cell(&self) -> String {
        match self {
            ItemContent::Text(text) | ItemContent::Markdown(text) => text.clone(),
            ItemContent::AudioLinks(urls) => to_list_string(urls),
        }
    }

    /// Key used for duplicate-content detection. URL lists compare as
    /// their normalized joined form.
    pub fn comparison_key(&self) -> String {
        self.as_cell()
    }

    pub fn is_empty(&self) -> bool {
        match self {
            ItemContent::Text(text) | ItemContent::Markdown(text) => text.trim().is_empty(),
            ItemContent::AudioLinks(urls) => urls.iter().all(|url| url.trim().is_empty()),
        }
    }

    pub fn urls(&self) -> &[String] {
        match self {
            ItemContent::AudioLinks(urls) => urls,
            _ => &[],
        }
    }
}

/// Per-item override of a study question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemQuestion {
    /// Study question number this override applies to.
    pub number: usize,
    pub prompt: Option<String>,
    /// Escaped comma-list; its length must equal the study question's
    /// scale-value count (checked by materials validation).
    pub scale_labels: Option<String>,
    pub legend: Option<String>,
}

/// Feedback shown when a participant picks one of the listed scale
/// values for a question on this item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFeedback {
    pub question: usize,
    /// Escaped comma-list of scale labels that trigger the feedback.
    pub scale_values: String,
    pub feedback: String,
}

/// One experimental item. Unique within its materials set by
/// `(number, condition)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    /// 1-based item number.
    pub number: u32,
    /// Condition label, at most 16 chars.
    pub condition: String,
    /// Per-item block, used when the materials set has no block override.
    pub block: i32,
    pub content: ItemContent,
    /// Audio-link studies only.
    pub audio_description: Option<String>,
    pub item_questions: Vec<ItemQuestion>,
    pub feedbacks: Vec<ItemFeedback>,
}

impl Item {
    pub fn new(number: u32, condition: impl Into<String>, content: ItemContent) -> Self {
        Item {
            number,
            condition: condition.into(),
            block: 1,
            content,
            audio_description: None,
            item_questions: Vec::new(),
            feedbacks: Vec::new(),
        }
    }

    /// Wire label, e.g. `3b`.
    pub fn label(&self) -> String {
        format!("{}{}", self.number, self.condition)
    }

    pub fn item_question(&self, number: usize) -> Option<&ItemQuestion> {
        self.item_questions.iter().find(|iq| iq.number == number)
    }
}

/// Parse a wire label like `3b` into `(number, condition)`.
pub fn parse_item_label(label: &str) -> Option<(u32, String)> {
    let digits_end = label.chars().take_while(|ch| ch.is_ascii_digit()).count();
    if digits_end == 0 || digits_end == label.len() {
        return None;
    }
    let number = label[..digits_end].parse().ok()?;
    Some((number, label[digits_end..].to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_round_trip() {
        let item = Item::new(3, "b", ItemContent::Text("x".into()));
        assert_eq!(item.label(), "3b");
        assert_eq!(parse_item_label("3b"), Some((3, "b".to_string())));
    }

    #[test]
    fn label_rejects_malformed() {
        assert_eq!(parse_item_label("b3"), None);
        assert_eq!(parse_item_label("12"), None);
        assert_eq!(parse_item_label(""), None);
    }

    #[test]
    fn audio_links_cell_round_trip() {
        let content = ItemContent::from_cell(
            ItemType::AudioLinks,
            "https://a.example/1.ogg,https://a.example/2.ogg",
        );
        assert_eq!(content.urls().len(), 2);
        assert_eq!(
            content.as_cell(),
            "https://a.example/1.ogg,https://a.example/2.ogg"
        );
    }

    #[test]
    fn empty_content() {
        assert!(ItemContent::Text("  ".into()).is_empty());
        assert!(ItemContent::AudioLinks(vec![]).is_empty());
        assert!(!ItemContent::Markdown("# hi".into()).is_empty());
    }
}
