//! Layout evaluation.
//!
//! Every element evaluates to an [`Output`] together with a [`GroupVars`]
//! summary of the variables it called. Groups use the summary to decide
//! whether they render at all: a group that called at least one variable
//! and got nothing back from any of them is suppressed, and reports itself
//! as missing to its own parent.

use crate::cite::{Cite, CitePosition};
use crate::disambiguation::{ItemDisambiguation, year_suffix_letters};
use crate::output::{Output, join_outputs};
use crate::reference::{DATE_VARIABLES, NAME_VARIABLES, Reference};
use crate::{date, names, number};
use citeproc_csl::{
    ChooseElement, Condition, ElementKind, EtAl, InheritableNameOptions, LabelElement,
    LabelPlural, Layout, Locale, MatchType, NodeId, Position, Style, TextSource, VariableForm,
};
use std::borrow::Cow;
use std::collections::HashSet;

/// What the layout is being evaluated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    Citation,
    Bibliography,
    /// Producing a sort key: names, dates and numbers render in sortable
    /// forms and no markup matters.
    Sort,
}

/// Variable summary of an evaluated subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GroupVars {
    /// No variable was called.
    NoVars,
    /// At least one called variable rendered.
    Important,
    /// Variables were called and all were empty.
    Missing,
}

impl GroupVars {
    pub(crate) fn from_rendered(rendered: bool) -> Self {
        if rendered {
            GroupVars::Important
        } else {
            GroupVars::Missing
        }
    }

    /// Summary of two siblings.
    pub(crate) fn neighbour(self, other: GroupVars) -> GroupVars {
        match (self, other) {
            (GroupVars::Important, _) | (_, GroupVars::Important) => GroupVars::Important,
            (GroupVars::Missing, _) | (_, GroupVars::Missing) => GroupVars::Missing,
            _ => GroupVars::NoVars,
        }
    }
}

/// Name list limits imposed by a sort key.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct NamesOverride {
    pub min: Option<u32>,
    pub use_first: Option<u32>,
    pub use_last: Option<bool>,
}

/// State for evaluating one reference against one layout.
pub(crate) struct EvalContext<'a> {
    pub style: &'a Style,
    pub locale: &'a Locale,
    pub reference: &'a Reference,
    pub cite: &'a Cite,
    pub mode: Mode,
    pub citation_number: Option<u32>,
    pub disambiguation: Option<&'a ItemDisambiguation>,
    /// Set once a date has carried the implicit year suffix.
    pub year_suffix_rendered: bool,
    /// Options inherited from `<style>` and the current layout's parent.
    pub name_options: InheritableNameOptions,
    pub names_override: Option<NamesOverride>,
    /// Variables consumed by a `<substitute>`; they render nothing after.
    suppressed: HashSet<String>,
    substituting: usize,
    /// `<name>`/`<et-al>` of each enclosing `<names>` whose substitute is
    /// being evaluated.
    pub substitute_parents: Vec<(Option<&'a citeproc_csl::Name>, Option<&'a EtAl>)>,
}

impl<'a> EvalContext<'a> {
    pub(crate) fn new(
        style: &'a Style,
        locale: &'a Locale,
        reference: &'a Reference,
        cite: &'a Cite,
        mode: Mode,
        layout: &'a Layout,
    ) -> Self {
        Self {
            style,
            locale,
            reference,
            cite,
            mode,
            citation_number: None,
            disambiguation: None,
            year_suffix_rendered: false,
            name_options: layout.name_options.merge(&style.name_options),
            names_override: None,
            suppressed: HashSet::new(),
            substituting: 0,
            substitute_parents: Vec::new(),
        }
    }

    pub(crate) fn with_citation_number(mut self, number: Option<u32>) -> Self {
        self.citation_number = number;
        self
    }

    pub(crate) fn with_disambiguation(
        mut self,
        disambiguation: Option<&'a ItemDisambiguation>,
    ) -> Self {
        self.disambiguation = disambiguation;
        self
    }

    /// Letters of the assigned year suffix, if any.
    pub(crate) fn year_suffix(&self) -> Option<String> {
        self.disambiguation
            .and_then(|d| d.year_suffix)
            .map(year_suffix_letters)
    }

    /// Suffix for the next rendered year when the style never calls the
    /// `year-suffix` variable itself. Only the first year gets it.
    pub(crate) fn take_implicit_year_suffix(&mut self) -> Option<String> {
        if self.year_suffix_rendered
            || self.mode == Mode::Sort
            || self.style.uses_year_suffix_variable()
        {
            return None;
        }
        let suffix = self.year_suffix()?;
        self.year_suffix_rendered = true;
        Some(suffix)
    }

    pub(crate) fn is_suppressed(&self, name: &str) -> bool {
        self.suppressed.contains(name)
    }

    /// Record that `name` rendered. Inside a substitute this suppresses it
    /// for the rest of the entry.
    pub(crate) fn mark_rendered(&mut self, name: &str) {
        if self.substituting > 0 {
            self.suppressed.insert(name.to_string());
        }
    }

    pub(crate) fn enter_substitute(
        &mut self,
        parent: (Option<&'a citeproc_csl::Name>, Option<&'a EtAl>),
    ) {
        self.substituting += 1;
        self.substitute_parents.push(parent);
    }

    pub(crate) fn leave_substitute(&mut self) {
        self.substituting -= 1;
        self.substitute_parents.pop();
    }

    /// A text or number variable, including the cite-level `locator` and
    /// the computed `citation-number`.
    pub(crate) fn variable(&self, name: &str) -> Option<Cow<'a, str>> {
        if self.is_suppressed(name) {
            return None;
        }
        match name {
            "locator" if self.mode != Mode::Bibliography => {
                self.cite.locator.as_deref().map(Cow::Borrowed)
            }
            "locator" => None,
            "citation-number" => self.citation_number.map(|n| Cow::Owned(n.to_string())),
            "year-suffix" => self.year_suffix().map(Cow::Owned),
            _ => self.reference.variable(name).map(Cow::Borrowed),
        }
    }

    pub(crate) fn has_variable(&self, name: &str) -> bool {
        if self.is_suppressed(name) {
            return false;
        }
        if NAME_VARIABLES.contains(&name) {
            return self.reference.names(name).is_some();
        }
        if DATE_VARIABLES.contains(&name) {
            return self.reference.date(name).is_some();
        }
        self.variable(name).is_some()
    }
}

/// Evaluate a layout's children. Layout-level formatting is applied by the
/// caller, since it wraps a whole citation cluster.
pub(crate) fn eval_layout(ctx: &mut EvalContext<'_>, layout: &Layout) -> Output {
    eval_children(ctx, &layout.children, "").0
}

/// Evaluate a macro by itself, for sort keys.
pub(crate) fn eval_macro(ctx: &mut EvalContext<'_>, id: citeproc_csl::MacroId) -> Output {
    let style = ctx.style;
    eval_children(ctx, &style.macro_def(id).children, "").0
}

pub(crate) fn eval_children(
    ctx: &mut EvalContext<'_>,
    children: &[NodeId],
    delimiter: &str,
) -> (Output, GroupVars) {
    let mut outputs = Vec::with_capacity(children.len());
    let mut vars = GroupVars::NoVars;
    for id in children {
        let (output, child_vars) = eval_element(ctx, *id);
        vars = vars.neighbour(child_vars);
        outputs.push(output);
    }
    (join_outputs(outputs, delimiter), vars)
}

pub(crate) fn eval_element(ctx: &mut EvalContext<'_>, id: NodeId) -> (Output, GroupVars) {
    let style = ctx.style;
    let element = style.node(id);

    let (output, vars) = match &element.kind {
        ElementKind::Text(source) => eval_text(ctx, source),
        ElementKind::Number(el) => number::eval_number(ctx, el),
        ElementKind::Label(el) => (eval_label(ctx, el), GroupVars::NoVars),
        ElementKind::Names(el) => names::eval_names(ctx, el),
        ElementKind::Date(el) => date::eval_date(ctx, el),
        ElementKind::Group(group) => {
            let delimiter = group.delimiter.as_deref().unwrap_or("");
            let (output, vars) = eval_children(ctx, &group.children, delimiter);
            if vars == GroupVars::Missing {
                (Output::Null, GroupVars::Missing)
            } else {
                (output, vars)
            }
        }
        ElementKind::Choose(choose) => eval_choose(ctx, choose),
    };

    if ctx.mode == Mode::Sort {
        return (output, vars);
    }
    (Output::formatted(element.formatting.clone(), vec![output]), vars)
}

fn eval_text(ctx: &mut EvalContext<'_>, source: &TextSource) -> (Output, GroupVars) {
    match source {
        TextSource::Variable { name, form } => {
            let value = match form {
                VariableForm::Short => ctx
                    .variable(&format!("{}-short", name))
                    .or_else(|| ctx.variable(name)),
                VariableForm::Long => ctx.variable(name),
            };
            let Some(value) = value else {
                return (Output::Null, GroupVars::Missing);
            };
            ctx.mark_rendered(name);
            let text = if name == "page" {
                number::format_page_range(
                    &value,
                    ctx.style.options.page_range_format,
                    ctx.locale,
                )
            } else {
                value.into_owned()
            };
            (Output::literal(text), GroupVars::Important)
        }
        TextSource::Macro { id, .. } => {
            let style = ctx.style;
            eval_children(ctx, &style.macro_def(*id).children, "")
        }
        TextSource::Term { name, form, plural } => {
            let text = ctx.locale.term_text(name, *form, *plural).unwrap_or("");
            (Output::literal(text), GroupVars::NoVars)
        }
        TextSource::Value(value) => (Output::literal(value.as_str()), GroupVars::NoVars),
    }
}

/// `<label>` outside `<names>`. Renders only when its variable has a
/// value, and never counts as a variable for group suppression.
fn eval_label(ctx: &mut EvalContext<'_>, el: &LabelElement) -> Output {
    if ctx.mode == Mode::Sort {
        return Output::Null;
    }

    let (term, contextual_plural) = if el.variable == "locator" {
        let Some(locator) = ctx.variable("locator") else {
            return Output::Null;
        };
        (ctx.cite.locator_label().to_string(), number::is_plural(&locator))
    } else if let Some(names) = ctx.reference.names(&el.variable) {
        if ctx.is_suppressed(&el.variable) {
            return Output::Null;
        }
        (el.variable.clone(), names.len() > 1)
    } else {
        let Some(value) = ctx.variable(&el.variable) else {
            return Output::Null;
        };
        let plural = match el.variable.as_str() {
            "number-of-pages" | "number-of-volumes" => number::leading_number(&value)
                .is_some_and(|n| n > 1),
            _ => number::is_plural(&value),
        };
        (el.variable.clone(), plural)
    };

    let plural = match el.plural {
        LabelPlural::Always => true,
        LabelPlural::Never => false,
        LabelPlural::Contextual => contextual_plural,
    };
    Output::literal(ctx.locale.term_text(&term, el.form, plural).unwrap_or(""))
}

fn eval_choose(ctx: &mut EvalContext<'_>, choose: &ChooseElement) -> (Output, GroupVars) {
    for branch in &choose.branches {
        let matches = branch.conditions.is_empty() || {
            let mut results = branch.conditions.iter().map(|c| eval_condition(ctx, c));
            match branch.match_type {
                MatchType::All => results.all(|r| r),
                MatchType::Any => results.any(|r| r),
                MatchType::None => !results.any(|r| r),
            }
        };
        if matches {
            return eval_children(ctx, &branch.children, "");
        }
    }
    (Output::Null, GroupVars::NoVars)
}

fn eval_condition(ctx: &EvalContext<'_>, condition: &Condition) -> bool {
    match condition {
        Condition::Type(ty) => ctx.reference.ref_type == *ty,
        Condition::Variable(name) => ctx.has_variable(name),
        Condition::IsNumeric(name) => ctx
            .variable(name)
            .is_some_and(|value| number::is_numeric(&value)),
        Condition::IsUncertainDate(name) => ctx
            .reference
            .date(name)
            .is_some_and(|date| date.circa),
        Condition::Locator(label) => {
            ctx.mode != Mode::Bibliography
                && ctx.cite.locator.is_some()
                && normalize_label(label) == ctx.cite.locator_label()
        }
        Condition::Position(position) => {
            ctx.mode == Mode::Citation && position_matches(ctx.cite, *position)
        }
        Condition::Disambiguate(wanted) => {
            let ambiguous =
                ctx.mode == Mode::Citation && ctx.disambiguation.is_some_and(|d| d.condition);
            ambiguous == *wanted
        }
    }
}

fn normalize_label(label: &str) -> &str {
    if label == "sub-verbo" { "sub verbo" } else { label }
}

fn position_matches(cite: &Cite, position: Position) -> bool {
    match position {
        Position::First => cite.position == CitePosition::First,
        Position::Subsequent => cite.position != CitePosition::First,
        Position::Ibid => matches!(
            cite.position,
            CitePosition::Ibid | CitePosition::IbidWithLocator
        ),
        Position::IbidWithLocator => cite.position == CitePosition::IbidWithLocator,
        Position::NearNote => cite.near_note && cite.position != CitePosition::First,
    }
}
