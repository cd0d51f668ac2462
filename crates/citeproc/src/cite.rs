//! Cite-level inputs and citation clusters.

use std::collections::HashMap;

/// Where a cite stands relative to earlier cites of the same item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CitePosition {
    #[default]
    First,
    Subsequent,
    /// Same item as the directly preceding cite.
    Ibid,
    /// As [`CitePosition::Ibid`], with a different locator.
    IbidWithLocator,
}

/// One cited item with its cite-specific decorations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cite {
    pub id: String,
    pub locator: Option<String>,
    /// Locator term such as `page` or `chapter`; `page` when unset.
    pub label: Option<String>,
    pub prefix: Option<String>,
    pub suffix: Option<String>,
    pub position: CitePosition,
    pub near_note: bool,
}

impl Cite {
    pub fn basic(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_locator(mut self, label: impl Into<String>, locator: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self.locator = Some(locator.into()).filter(|l: &String| !l.is_empty());
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    pub fn with_position(mut self, position: CitePosition) -> Self {
        self.position = position;
        self
    }

    /// The locator label, normalized to its term name.
    pub fn locator_label(&self) -> &str {
        match self.label.as_deref() {
            None | Some("") => "page",
            Some("sub-verbo") => "sub verbo",
            Some(label) => label,
        }
    }
}

/// Caller-chosen cluster identifier.
pub type ClusterId = u32;

/// The cites of one citation, as placed in the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cluster {
    pub id: ClusterId,
    pub cites: Vec<Cite>,
    /// Footnote number; clusters outside notes count as note 0.
    pub note_number: Option<u32>,
}

impl Cluster {
    pub fn new(id: ClusterId, cites: Vec<Cite>) -> Self {
        Self {
            id,
            cites,
            note_number: None,
        }
    }

    pub fn with_note_number(mut self, note: u32) -> Self {
        self.note_number = Some(note);
        self
    }
}

/// Copies of each cluster's cites with `position` and `near_note` set
/// from document order. A cite is ibid when the cite directly before it
/// is of the same item: the previous cite in its cluster, or for a first
/// cite the previous cluster's only cite.
pub(crate) fn assign_positions(clusters: &[Cluster], near_note_distance: u32) -> Vec<Vec<Cite>> {
    let mut last_note: HashMap<&str, u32> = HashMap::new();
    let mut previous: Option<&[Cite]> = None;
    let mut positioned = Vec::with_capacity(clusters.len());

    for cluster in clusters {
        let note = cluster.note_number.unwrap_or(0);
        let mut cites = Vec::with_capacity(cluster.cites.len());
        for (i, cite) in cluster.cites.iter().enumerate() {
            let before = match i {
                0 => previous.and_then(|p| match p {
                    [only] => Some(only),
                    _ => None,
                }),
                _ => cluster.cites.get(i - 1),
            };
            let seen = last_note.insert(cite.id.as_str(), note);
            let mut cite = cite.clone();
            cite.position = match (seen, before) {
                (None, _) => CitePosition::First,
                (Some(_), Some(before)) if before.id == cite.id => ibid_position(before, &cite),
                (Some(_), _) => CitePosition::Subsequent,
            };
            cite.near_note = seen.is_some_and(|seen| note.abs_diff(seen) <= near_note_distance);
            cites.push(cite);
        }
        previous = Some(&cluster.cites);
        positioned.push(cites);
    }
    positioned
}

/// A repeat of `before` with no locator after one that had a locator is
/// not ibid.
fn ibid_position(before: &Cite, cite: &Cite) -> CitePosition {
    match (&before.locator, &cite.locator) {
        (None, None) => CitePosition::Ibid,
        (Some(_), None) => CitePosition::Subsequent,
        (None, Some(_)) => CitePosition::IbidWithLocator,
        (Some(a), Some(b)) if a == b && before.locator_label() == cite.locator_label() => {
            CitePosition::Ibid
        }
        (Some(_), Some(_)) => CitePosition::IbidWithLocator,
    }
}
