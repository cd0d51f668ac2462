//! Style document model.
//!
//! A [`Style`] owns every layout node in a single arena. Layouts, groups,
//! choose branches, substitutes and macros refer to their children through
//! [`NodeId`]s, and `<text macro="...">` holds the [`MacroId`] it was
//! resolved to while parsing. Nothing is looked up by name at render time.

use crate::locale::{DateForm, DatePart, Locale, TermForm};
use citeproc_xml::Span;

/// Index of a node in [`Style`]'s arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a macro definition in [`Style`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacroId(pub(crate) u32);

impl MacroId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A parsed, validated CSL style. Immutable once built.
#[derive(Debug, Clone)]
pub struct Style {
    pub version: String,
    pub class: StyleClass,
    pub default_locale: Option<String>,
    pub options: StyleOptions,
    pub info: Option<StyleInfo>,
    /// `<locale>` overrides embedded in the style, in document order.
    pub locales: Vec<Locale>,
    /// Name options set on `<style>` itself.
    pub name_options: InheritableNameOptions,
    pub citation: Layout,
    /// Attributes that only `<citation>` carries.
    pub citation_options: CitationOptions,
    pub bibliography: Option<Layout>,
    pub span: Span,
    pub(crate) nodes: Vec<Element>,
    pub(crate) macros: Vec<Macro>,
}

impl Style {
    /// Node by id. Ids handed out by this style are always in range.
    pub fn node(&self, id: NodeId) -> &Element {
        &self.nodes[id.index()]
    }

    pub fn macro_def(&self, id: MacroId) -> &Macro {
        &self.macros[id.index()]
    }

    pub fn macro_by_name(&self, name: &str) -> Option<MacroId> {
        self.macros
            .iter()
            .position(|m| m.name == name)
            .and_then(|i| u32::try_from(i).ok())
            .map(MacroId)
    }

    pub fn macros(&self) -> impl Iterator<Item = &Macro> {
        self.macros.iter()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// The inline `<locale>` whose `xml:lang` equals `lang`; `None` selects
    /// the locale without a language.
    pub fn inline_locale(&self, lang: Option<&str>) -> Option<&Locale> {
        self.locales.iter().find(|l| l.lang.as_deref() == lang)
    }

    /// Whether any node renders `year-suffix` explicitly. When none does, an
    /// assigned suffix follows the first rendered year instead.
    pub fn uses_year_suffix_variable(&self) -> bool {
        self.nodes.iter().any(|node| {
            matches!(
                &node.kind,
                ElementKind::Text(TextSource::Variable { name, .. }) if name == "year-suffix"
            )
        })
    }

    /// Whether any `<choose>` tests `disambiguate`.
    pub fn tests_disambiguate(&self) -> bool {
        self.nodes.iter().any(|node| match &node.kind {
            ElementKind::Choose(choose) => choose.branches.iter().any(|branch| {
                branch
                    .conditions
                    .iter()
                    .any(|c| matches!(c, Condition::Disambiguate(_)))
            }),
            _ => false,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleClass {
    InText,
    Note,
}

/// Global options on `<style>`.
#[derive(Debug, Clone)]
pub struct StyleOptions {
    pub demote_non_dropping_particle: DemoteNonDroppingParticle,
    pub initialize_with_hyphen: bool,
    pub page_range_format: Option<PageRangeFormat>,
}

impl Default for StyleOptions {
    fn default() -> Self {
        Self {
            demote_non_dropping_particle: DemoteNonDroppingParticle::default(),
            initialize_with_hyphen: true,
            page_range_format: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DemoteNonDroppingParticle {
    Never,
    #[default]
    SortOnly,
    DisplayAndSort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageRangeFormat {
    Chicago,
    Expanded,
    Minimal,
    MinimalTwo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CitationOptions {
    pub disambiguation: DisambiguationStrategy,
    /// A repeat cite at most this many notes after the previous cite of
    /// the same item is `near-note`.
    pub near_note_distance: u32,
}

impl Default for CitationOptions {
    fn default() -> Self {
        Self {
            disambiguation: DisambiguationStrategy::default(),
            near_note_distance: 5,
        }
    }
}

/// Methods `<citation>` enables for telling apart cites that render
/// identically. They run in field order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DisambiguationStrategy {
    pub add_names: bool,
    /// `disambiguate-add-givenname`, with the rule in effect.
    pub add_givenname: Option<GivenNameDisambiguationRule>,
    pub add_year_suffix: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GivenNameDisambiguationRule {
    AllNames,
    AllNamesWithInitials,
    PrimaryName,
    PrimaryNameWithInitials,
    #[default]
    ByCite,
}

impl GivenNameDisambiguationRule {
    /// Only the first name of each list may be expanded.
    pub fn primary_only(self) -> bool {
        matches!(self, Self::PrimaryName | Self::PrimaryNameWithInitials)
    }

    /// Expansion stops at initials.
    pub fn initials_only(self) -> bool {
        matches!(self, Self::AllNamesWithInitials | Self::PrimaryNameWithInitials)
    }
}

/// `<info>` metadata. Only the fields the engine reports are kept.
#[derive(Debug, Clone, Default)]
pub struct StyleInfo {
    pub title: Option<String>,
    pub id: Option<String>,
    pub updated: Option<String>,
}

/// A named, reusable layout fragment.
#[derive(Debug, Clone)]
pub struct Macro {
    pub name: String,
    pub children: Vec<NodeId>,
    pub span: Span,
}

/// `<citation>` or `<bibliography>` together with its `<layout>`.
#[derive(Debug, Clone)]
pub struct Layout {
    /// Affixes and font attributes of `<layout>`.
    pub formatting: Formatting,
    /// Delimiter between cites in a citation cluster.
    pub delimiter: Option<String>,
    pub sort: Option<Sort>,
    /// Name options from the `<citation>`/`<bibliography>` element.
    pub name_options: InheritableNameOptions,
    pub children: Vec<NodeId>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct Sort {
    pub keys: Vec<SortKey>,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub struct SortKey {
    pub key: SortKeyType,
    pub order: SortOrder,
    pub names_min: Option<u32>,
    pub names_use_first: Option<u32>,
    pub names_use_last: Option<bool>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortKeyType {
    Variable(String),
    Macro(MacroId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// One layout node.
#[derive(Debug, Clone)]
pub struct Element {
    pub kind: ElementKind,
    pub formatting: Formatting,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum ElementKind {
    Text(TextSource),
    Number(NumberElement),
    Label(LabelElement),
    Names(NamesElement),
    Date(DateElement),
    Group(GroupElement),
    Choose(ChooseElement),
}

#[derive(Debug, Clone)]
pub enum TextSource {
    Variable { name: String, form: VariableForm },
    Macro { id: MacroId, name: String },
    Term { name: String, form: TermForm, plural: bool },
    Value(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VariableForm {
    #[default]
    Long,
    Short,
}

#[derive(Debug, Clone)]
pub struct NumberElement {
    pub variable: String,
    pub form: NumberForm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NumberForm {
    #[default]
    Numeric,
    Ordinal,
    LongOrdinal,
    Roman,
}

#[derive(Debug, Clone)]
pub struct LabelElement {
    pub variable: String,
    pub form: TermForm,
    pub plural: LabelPlural,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LabelPlural {
    #[default]
    Contextual,
    Always,
    Never,
}

#[derive(Debug, Clone)]
pub struct NamesElement {
    pub variables: Vec<String>,
    /// Delimiter between the output of different name variables.
    pub delimiter: Option<String>,
    pub name: Option<Name>,
    pub et_al: Option<EtAl>,
    pub label: Option<NamesLabel>,
    /// `<label>` appeared before `<name>`.
    pub label_before_name: bool,
    pub substitute: Option<Vec<NodeId>>,
}

/// `<name>` options and formatting.
#[derive(Debug, Clone, Default)]
pub struct Name {
    pub options: InheritableNameOptions,
    pub formatting: Formatting,
    pub family_formatting: Option<Formatting>,
    pub given_formatting: Option<Formatting>,
}

#[derive(Debug, Clone, Default)]
pub struct EtAl {
    /// `et-al` unless set to `and others`.
    pub term: Option<String>,
    pub formatting: Formatting,
}

#[derive(Debug, Clone)]
pub struct NamesLabel {
    pub form: TermForm,
    pub plural: LabelPlural,
    pub formatting: Formatting,
}

/// Name options inherited style → citation/bibliography → name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InheritableNameOptions {
    pub and: Option<NameAnd>,
    pub delimiter: Option<String>,
    pub delimiter_precedes_last: Option<DelimiterPrecedes>,
    pub delimiter_precedes_et_al: Option<DelimiterPrecedes>,
    pub et_al_min: Option<u32>,
    pub et_al_use_first: Option<u32>,
    pub et_al_use_last: Option<bool>,
    pub initialize: Option<bool>,
    pub initialize_with: Option<String>,
    pub form: Option<NameForm>,
    pub name_as_sort_order: Option<NameAsSortOrder>,
    pub sort_separator: Option<String>,
}

impl InheritableNameOptions {
    /// Combine with `fallback`, keeping `self`'s values where set.
    pub fn merge(&self, fallback: &Self) -> Self {
        Self {
            and: self.and.or(fallback.and),
            delimiter: self.delimiter.clone().or_else(|| fallback.delimiter.clone()),
            delimiter_precedes_last: self
                .delimiter_precedes_last
                .or(fallback.delimiter_precedes_last),
            delimiter_precedes_et_al: self
                .delimiter_precedes_et_al
                .or(fallback.delimiter_precedes_et_al),
            et_al_min: self.et_al_min.or(fallback.et_al_min),
            et_al_use_first: self.et_al_use_first.or(fallback.et_al_use_first),
            et_al_use_last: self.et_al_use_last.or(fallback.et_al_use_last),
            initialize: self.initialize.or(fallback.initialize),
            initialize_with: self
                .initialize_with
                .clone()
                .or_else(|| fallback.initialize_with.clone()),
            form: self.form.or(fallback.form),
            name_as_sort_order: self.name_as_sort_order.or(fallback.name_as_sort_order),
            sort_separator: self
                .sort_separator
                .clone()
                .or_else(|| fallback.sort_separator.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameAnd {
    Text,
    Symbol,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DelimiterPrecedes {
    #[default]
    Contextual,
    AfterInvertedName,
    Always,
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NameForm {
    #[default]
    Long,
    Short,
    Count,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameAsSortOrder {
    First,
    All,
}

#[derive(Debug, Clone)]
pub struct DateElement {
    pub variable: String,
    /// Localized form; `None` means the parts below are the whole format.
    pub form: Option<DateForm>,
    pub date_parts: DatePartsFilter,
    /// Inline parts. With a localized form these override matching parts.
    pub parts: Vec<DatePart>,
    pub delimiter: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DatePartsFilter {
    Year,
    YearMonth,
    #[default]
    YearMonthDay,
}

#[derive(Debug, Clone)]
pub struct GroupElement {
    pub children: Vec<NodeId>,
    pub delimiter: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ChooseElement {
    pub branches: Vec<ChooseBranch>,
}

/// `if`, `else-if` or `else` (no conditions).
#[derive(Debug, Clone)]
pub struct ChooseBranch {
    pub conditions: Vec<Condition>,
    pub match_type: MatchType,
    pub children: Vec<NodeId>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchType {
    #[default]
    All,
    Any,
    None,
}

/// One test attribute of a branch. Multi-valued attributes expand into one
/// condition per value so that `match` applies across all of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    Type(String),
    Variable(String),
    IsNumeric(String),
    IsUncertainDate(String),
    Locator(String),
    Position(Position),
    Disambiguate(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    First,
    Subsequent,
    IbidWithLocator,
    Ibid,
    NearNote,
}

/// Formatting attributes shared by rendering elements.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Formatting {
    pub font_style: Option<FontStyle>,
    pub font_variant: Option<FontVariant>,
    pub font_weight: Option<FontWeight>,
    pub text_decoration: Option<TextDecoration>,
    pub vertical_align: Option<VerticalAlign>,
    pub text_case: Option<TextCase>,
    pub prefix: Option<String>,
    pub suffix: Option<String>,
    pub display: Option<Display>,
    pub quotes: bool,
    pub strip_periods: bool,
}

impl Formatting {
    pub fn is_default(&self) -> bool {
        *self == Formatting::default()
    }

    /// Any attribute that changes the look of the text itself.
    pub fn has_styling(&self) -> bool {
        self.font_style.is_some()
            || self.font_variant.is_some()
            || self.font_weight.is_some()
            || self.text_decoration.is_some()
            || self.vertical_align.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontStyle {
    Normal,
    Italic,
    Oblique,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontVariant {
    Normal,
    SmallCaps,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontWeight {
    Normal,
    Bold,
    Light,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextDecoration {
    None,
    Underline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerticalAlign {
    Baseline,
    Sup,
    Sub,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextCase {
    Lowercase,
    Uppercase,
    CapitalizeFirst,
    CapitalizeAll,
    Sentence,
    Title,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Display {
    Block,
    LeftMargin,
    RightInline,
    Indent,
}
