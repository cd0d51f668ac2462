//! Intermediate output of layout evaluation.
//!
//! Evaluation builds an [`Output`] tree in which formatting is structural.
//! Turning the tree into text for a particular [`OutputFormat`] is a
//! separate final pass, see [`crate::format`].
//!
//! [`OutputFormat`]: crate::OutputFormat

use citeproc_csl::Formatting;

/// Styled text before the final format pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// Children with formatting (affixes, fonts, quotes, text case) applied
    /// around them as a unit.
    Formatted {
        formatting: Formatting,
        children: Vec<Output>,
    },
    Literal(String),
    Null,
}

impl Output {
    /// A text leaf; empty text is [`Output::Null`].
    pub fn literal(s: impl Into<String>) -> Self {
        let s = s.into();
        if s.is_empty() {
            Output::Null
        } else {
            Output::Literal(s)
        }
    }

    /// Wrap children in formatting. Null children are dropped, and nothing
    /// left means nothing rendered: affixes never print on their own.
    pub fn formatted(formatting: Formatting, children: Vec<Output>) -> Self {
        let children: Vec<_> = children.into_iter().filter(|c| !c.is_null()).collect();
        if children.is_empty() {
            Output::Null
        } else if formatting.is_default() {
            Output::sequence(children)
        } else {
            Output::Formatted {
                formatting,
                children,
            }
        }
    }

    /// Concatenate without formatting. A single child is returned as is.
    pub fn sequence(children: Vec<Output>) -> Self {
        let mut children: Vec<_> = children.into_iter().filter(|c| !c.is_null()).collect();
        match children.len() {
            0 => Output::Null,
            1 => children.pop().unwrap_or(Output::Null),
            _ => Output::Formatted {
                formatting: Formatting::default(),
                children,
            },
        }
    }

    pub fn is_null(&self) -> bool {
        match self {
            Output::Null => true,
            Output::Literal(s) => s.is_empty(),
            Output::Formatted { children, .. } => children.iter().all(Output::is_null),
        }
    }

    /// The text content with all formatting, affixes included, dropped.
    /// Used for sort keys.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match self {
            Output::Null => {}
            Output::Literal(s) => out.push_str(s),
            Output::Formatted {
                formatting,
                children,
            } => {
                if let Some(prefix) = &formatting.prefix {
                    out.push_str(prefix);
                }
                for child in children {
                    child.collect_text(out);
                }
                if let Some(suffix) = &formatting.suffix {
                    out.push_str(suffix);
                }
            }
        }
    }
}

/// Join outputs with a delimiter, skipping null ones.
pub fn join_outputs(outputs: Vec<Output>, delimiter: &str) -> Output {
    let non_null: Vec<_> = outputs.into_iter().filter(|o| !o.is_null()).collect();

    let mut children = Vec::with_capacity(non_null.len() * 2);
    for (i, output) in non_null.into_iter().enumerate() {
        if i > 0 && !delimiter.is_empty() {
            children.push(Output::Literal(delimiter.to_string()));
        }
        children.push(output);
    }

    Output::sequence(children)
}
