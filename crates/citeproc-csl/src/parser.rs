//! Builds [`Style`] and [`Locale`] values from parsed XML.
//!
//! Styles are parsed in two passes. The first pass assigns a [`MacroId`] to
//! every `<macro>` so that the second pass can resolve `<text macro="...">`
//! and sort keys as it builds the node arena. Cycles between macros are
//! rejected once all macro bodies exist.

use crate::error::{Error, Result};
use crate::locale::*;
use crate::types::*;
use citeproc_xml::{Span, XmlAttribute, XmlDocument, XmlElement};
use std::collections::HashMap;

/// Parse a CSL style document.
///
/// ```rust
/// let style = citeproc_csl::parse_style(
///     r#"<style xmlns="http://purl.org/net/xbiblio/csl" class="note" version="1.0">
///   <citation><layout><text variable="title"/></layout></citation>
/// </style>"#,
/// ).unwrap();
/// assert_eq!(style.class, citeproc_csl::StyleClass::Note);
/// assert!(style.bibliography.is_none());
/// ```
pub fn parse_style(content: &str) -> Result<Style> {
    let doc = citeproc_xml::parse(content)?;
    parse_style_document(&doc)
}

/// Parse a style from an already parsed XML document.
pub fn parse_style_document(doc: &XmlDocument) -> Result<Style> {
    StyleParser::default().parse_style(&doc.root)
}

/// Parse a standalone `<locale>` document.
pub fn parse_locale(content: &str) -> Result<Locale> {
    let doc = citeproc_xml::parse(content)?;
    if doc.root.name != "locale" {
        return Err(Error::InvalidRootElement {
            found: doc.root.name.clone(),
            expected: "locale",
            span: doc.root.name_span,
        });
    }
    StyleParser::default().parse_locale(&doc.root)
}

#[derive(Default)]
struct StyleParser {
    nodes: Vec<Element>,
    macro_ids: HashMap<String, MacroId>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    New,
    Active,
    Done,
}

impl StyleParser {
    fn parse_style(mut self, element: &XmlElement) -> Result<Style> {
        if element.name != "style" {
            return Err(Error::InvalidRootElement {
                found: element.name.clone(),
                expected: "style",
                span: element.name_span,
            });
        }

        let version_attr = self.require_attr(element, "version")?;
        let version = version_attr.value.clone();
        if !is_supported_version(&version) {
            return Err(Error::InvalidVersion {
                version,
                span: version_attr.value_span,
            });
        }

        let class = self
            .enum_attr(
                element,
                "class",
                &[("in-text", StyleClass::InText), ("note", StyleClass::Note)],
            )?
            .ok_or_else(|| self.missing_attr(element, "class"))?;

        let default_locale = self.string_attr(element, "default-locale");
        let options = self.parse_style_options(element)?;
        let name_options = self.parse_name_options(element, true)?;

        self.collect_macro_names(element)?;

        let mut info = None;
        let mut locales = Vec::new();
        let mut macros = Vec::new();
        let mut citation = None;
        let mut citation_options = CitationOptions::default();
        let mut bibliography = None;

        for child in element.all_children() {
            match child.name.as_str() {
                "info" => info = Some(self.parse_info(child)),
                "locale" => locales.push(self.parse_locale(child)?),
                "macro" => {
                    let name = self.require_attr(child, "name")?.value.clone();
                    let children = self.parse_children(child)?;
                    macros.push(Macro {
                        name,
                        children,
                        span: child.span,
                    });
                }
                "citation" => {
                    citation_options = self.parse_citation_options(child)?;
                    citation = Some(self.parse_layout(child)?);
                }
                "bibliography" => bibliography = Some(self.parse_layout(child)?),
                other => {
                    return Err(Error::UnexpectedElement {
                        element: other.to_string(),
                        context: "<style>".to_string(),
                        span: child.name_span,
                    });
                }
            }
        }

        let citation = citation.ok_or_else(|| Error::MissingElement {
            parent: "style".to_string(),
            element: "citation".to_string(),
            span: element.name_span,
        })?;

        self.check_macro_cycles(&macros)?;

        Ok(Style {
            version,
            class,
            default_locale,
            options,
            info,
            locales,
            name_options,
            citation,
            citation_options,
            bibliography,
            span: element.span,
            nodes: self.nodes,
            macros,
        })
    }

    /// First pass: number macros in document order.
    fn collect_macro_names(&mut self, style: &XmlElement) -> Result<()> {
        let mut first_seen: HashMap<String, Span> = HashMap::new();
        for child in style.get_children("macro") {
            let name = self.require_attr(child, "name")?.value.clone();
            if let Some(first) = first_seen.get(&name) {
                return Err(Error::DuplicateMacro {
                    name,
                    first: *first,
                    second: child.span,
                });
            }
            first_seen.insert(name.clone(), child.span);
            let id = MacroId(self.macro_ids.len() as u32);
            self.macro_ids.insert(name, id);
        }
        Ok(())
    }

    fn resolve_macro(&self, attr: &XmlAttribute) -> Result<MacroId> {
        self.macro_ids
            .get(&attr.value)
            .copied()
            .ok_or_else(|| Error::UndefinedMacro {
                name: attr.value.clone(),
                span: attr.value_span,
                suggestion: find_similar_macro(&attr.value, self.macro_ids.keys()),
            })
    }

    fn check_macro_cycles(&self, macros: &[Macro]) -> Result<()> {
        let mut state = vec![Visit::New; macros.len()];
        let mut chain = Vec::new();
        for index in 0..macros.len() {
            if state[index] == Visit::New {
                self.visit_macro(index, macros, &mut state, &mut chain)?;
            }
        }
        Ok(())
    }

    fn visit_macro(
        &self,
        index: usize,
        macros: &[Macro],
        state: &mut [Visit],
        chain: &mut Vec<usize>,
    ) -> Result<()> {
        state[index] = Visit::Active;
        chain.push(index);

        let mut refs = Vec::new();
        self.collect_macro_refs(&macros[index].children, &mut refs);
        for (target, span) in refs {
            let target = target.index();
            match state[target] {
                Visit::Active => {
                    let start = chain.iter().position(|&i| i == target).unwrap_or(0);
                    let mut names: Vec<String> = chain[start..]
                        .iter()
                        .map(|&i| macros[i].name.clone())
                        .collect();
                    names.push(macros[target].name.clone());
                    return Err(Error::CircularMacro { chain: names, span });
                }
                Visit::New => self.visit_macro(target, macros, state, chain)?,
                Visit::Done => {}
            }
        }

        chain.pop();
        state[index] = Visit::Done;
        Ok(())
    }

    fn collect_macro_refs(&self, ids: &[NodeId], refs: &mut Vec<(MacroId, Span)>) {
        for &id in ids {
            let element = &self.nodes[id.index()];
            match &element.kind {
                ElementKind::Text(TextSource::Macro { id, .. }) => refs.push((*id, element.span)),
                ElementKind::Group(group) => self.collect_macro_refs(&group.children, refs),
                ElementKind::Choose(choose) => {
                    for branch in &choose.branches {
                        self.collect_macro_refs(&branch.children, refs);
                    }
                }
                ElementKind::Names(names) => {
                    if let Some(substitute) = &names.substitute {
                        self.collect_macro_refs(substitute, refs);
                    }
                }
                _ => {}
            }
        }
    }

    fn parse_style_options(&self, element: &XmlElement) -> Result<StyleOptions> {
        let defaults = StyleOptions::default();
        Ok(StyleOptions {
            demote_non_dropping_particle: self
                .enum_attr(
                    element,
                    "demote-non-dropping-particle",
                    &[
                        ("never", DemoteNonDroppingParticle::Never),
                        ("sort-only", DemoteNonDroppingParticle::SortOnly),
                        ("display-and-sort", DemoteNonDroppingParticle::DisplayAndSort),
                    ],
                )?
                .unwrap_or(defaults.demote_non_dropping_particle),
            initialize_with_hyphen: self
                .bool_attr(element, "initialize-with-hyphen")?
                .unwrap_or(defaults.initialize_with_hyphen),
            page_range_format: self.enum_attr(
                element,
                "page-range-format",
                &[
                    ("chicago", PageRangeFormat::Chicago),
                    ("chicago-15", PageRangeFormat::Chicago),
                    ("chicago-16", PageRangeFormat::Chicago),
                    ("expanded", PageRangeFormat::Expanded),
                    ("minimal", PageRangeFormat::Minimal),
                    ("minimal-two", PageRangeFormat::MinimalTwo),
                ],
            )?,
        })
    }

    fn parse_citation_options(&self, element: &XmlElement) -> Result<CitationOptions> {
        let defaults = CitationOptions::default();
        let rule = self
            .enum_attr(
                element,
                "givenname-disambiguation-rule",
                &[
                    ("all-names", GivenNameDisambiguationRule::AllNames),
                    (
                        "all-names-with-initials",
                        GivenNameDisambiguationRule::AllNamesWithInitials,
                    ),
                    ("primary-name", GivenNameDisambiguationRule::PrimaryName),
                    (
                        "primary-name-with-initials",
                        GivenNameDisambiguationRule::PrimaryNameWithInitials,
                    ),
                    ("by-cite", GivenNameDisambiguationRule::ByCite),
                ],
            )?
            .unwrap_or_default();
        let add_givenname = self
            .bool_attr(element, "disambiguate-add-givenname")?
            .unwrap_or(false);

        Ok(CitationOptions {
            disambiguation: DisambiguationStrategy {
                add_names: self
                    .bool_attr(element, "disambiguate-add-names")?
                    .unwrap_or(false),
                add_givenname: add_givenname.then_some(rule),
                add_year_suffix: self
                    .bool_attr(element, "disambiguate-add-year-suffix")?
                    .unwrap_or(false),
            },
            near_note_distance: self
                .u32_attr(element, "near-note-distance")?
                .unwrap_or(defaults.near_note_distance),
        })
    }

    fn parse_info(&self, element: &XmlElement) -> StyleInfo {
        let text_of = |name: &str| {
            element
                .get_child(name)
                .map(|c| c.text_content().trim().to_string())
        };
        StyleInfo {
            title: text_of("title"),
            id: text_of("id"),
            updated: text_of("updated"),
        }
    }

    fn parse_locale(&self, element: &XmlElement) -> Result<Locale> {
        let lang = element
            .get_prefixed_attribute("xml", "lang")
            .map(|a| a.value.clone());

        let mut locale = Locale {
            lang,
            span: element.span,
            ..Locale::default()
        };

        for child in element.all_children() {
            match child.name.as_str() {
                "terms" => {
                    for term_el in child.get_children("term") {
                        // Gendered variants would shadow the neutral term.
                        if term_el.get_attribute("gender-form").is_some() {
                            continue;
                        }
                        let term = self.parse_term(term_el)?;
                        locale
                            .terms
                            .insert(TermKey::new(term.name.clone(), term.form), term);
                    }
                }
                "date" => {
                    let format = self.parse_date_format(child)?;
                    locale.date_formats.insert(format.form, format);
                }
                "style-options" => {
                    locale.options = LocaleOptions {
                        punctuation_in_quote: self.bool_attr(child, "punctuation-in-quote")?,
                        limit_day_ordinals_to_day_1: self
                            .bool_attr(child, "limit-day-ordinals-to-day-1")?,
                    };
                }
                _ => {}
            }
        }

        Ok(locale)
    }

    fn parse_term(&self, element: &XmlElement) -> Result<Term> {
        let name = self.require_attr(element, "name")?.value.clone();
        let form = self.parse_term_form(element)?.unwrap_or_default();
        let match_kind = self.enum_attr(
            element,
            "match",
            &[
                ("last-digit", OrdinalMatch::LastDigit),
                ("last-two-digits", OrdinalMatch::LastTwoDigits),
                ("whole-number", OrdinalMatch::WholeNumber),
            ],
        )?;

        let (single, multiple) = match element.get_child("single") {
            Some(single) => (
                single.text_content(),
                element.get_child("multiple").map(|m| m.text_content()),
            ),
            // An empty <term/> deliberately defines the term as "".
            None => (element.text_content(), None),
        };

        Ok(Term {
            name,
            form,
            single,
            multiple,
            match_kind,
        })
    }

    fn parse_term_form(&self, element: &XmlElement) -> Result<Option<TermForm>> {
        self.enum_attr(
            element,
            "form",
            &[
                ("long", TermForm::Long),
                ("short", TermForm::Short),
                ("verb", TermForm::Verb),
                ("verb-short", TermForm::VerbShort),
                ("symbol", TermForm::Symbol),
            ],
        )
    }

    fn parse_date_form(&self, element: &XmlElement) -> Result<Option<DateForm>> {
        self.enum_attr(
            element,
            "form",
            &[("text", DateForm::Text), ("numeric", DateForm::Numeric)],
        )
    }

    fn parse_date_format(&self, element: &XmlElement) -> Result<DateFormat> {
        let form = self
            .parse_date_form(element)?
            .ok_or_else(|| self.missing_attr(element, "form"))?;
        Ok(DateFormat {
            form,
            parts: self.parse_date_parts(element)?,
            delimiter: self.string_attr(element, "delimiter"),
            span: element.span,
        })
    }

    fn parse_date_parts(&self, element: &XmlElement) -> Result<Vec<DatePart>> {
        element
            .get_children("date-part")
            .into_iter()
            .map(|part| self.parse_date_part(part))
            .collect()
    }

    fn parse_date_part(&self, element: &XmlElement) -> Result<DatePart> {
        let name = self
            .enum_attr(
                element,
                "name",
                &[
                    ("year", DatePartName::Year),
                    ("month", DatePartName::Month),
                    ("day", DatePartName::Day),
                ],
            )?
            .ok_or_else(|| self.missing_attr(element, "name"))?;

        let form = self.enum_attr(
            element,
            "form",
            &[
                ("long", DatePartForm::Long),
                ("short", DatePartForm::Short),
                ("numeric", DatePartForm::Numeric),
                ("numeric-leading-zeros", DatePartForm::NumericLeadingZeros),
                ("ordinal", DatePartForm::Ordinal),
            ],
        )?;

        Ok(DatePart {
            name,
            form,
            formatting: self.parse_formatting(element)?,
            range_delimiter: self.string_attr(element, "range-delimiter"),
            span: element.span,
        })
    }

    fn parse_layout(&mut self, element: &XmlElement) -> Result<Layout> {
        let name_options = self.parse_name_options(element, true)?;

        let layout_el = element
            .get_child("layout")
            .ok_or_else(|| Error::MissingElement {
                parent: element.name.clone(),
                element: "layout".to_string(),
                span: element.name_span,
            })?;

        let sort = element
            .get_child("sort")
            .map(|s| self.parse_sort(s))
            .transpose()?;

        let formatting = self.parse_formatting(layout_el)?;
        let delimiter = self.string_attr(layout_el, "delimiter");
        let children = self.parse_children(layout_el)?;

        Ok(Layout {
            formatting,
            delimiter,
            sort,
            name_options,
            children,
            span: element.span,
        })
    }

    fn parse_sort(&self, element: &XmlElement) -> Result<Sort> {
        let keys = element
            .get_children("key")
            .into_iter()
            .map(|key| self.parse_sort_key(key))
            .collect::<Result<Vec<_>>>()?;
        Ok(Sort {
            keys,
            span: element.span,
        })
    }

    fn parse_sort_key(&self, element: &XmlElement) -> Result<SortKey> {
        let key = if let Some(var) = element.get_attribute("variable") {
            SortKeyType::Variable(var.to_string())
        } else if let Some(mac) = element.get_attribute_full("macro") {
            SortKeyType::Macro(self.resolve_macro(mac)?)
        } else {
            return Err(self.missing_attr(element, "variable or macro"));
        };

        Ok(SortKey {
            key,
            order: self
                .enum_attr(
                    element,
                    "sort",
                    &[
                        ("ascending", SortOrder::Ascending),
                        ("descending", SortOrder::Descending),
                    ],
                )?
                .unwrap_or_default(),
            names_min: self.u32_attr(element, "names-min")?,
            names_use_first: self.u32_attr(element, "names-use-first")?,
            names_use_last: self.bool_attr(element, "names-use-last")?,
            span: element.span,
        })
    }

    /// Parse the rendering elements below `parent` into the arena.
    fn parse_children(&mut self, parent: &XmlElement) -> Result<Vec<NodeId>> {
        let mut ids = Vec::new();
        for child in parent.all_children() {
            let element = self.parse_element(child, &parent.name)?;
            ids.push(self.push(element));
        }
        Ok(ids)
    }

    fn push(&mut self, element: Element) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(element);
        id
    }

    fn parse_element(&mut self, element: &XmlElement, context: &str) -> Result<Element> {
        let kind = match element.name.as_str() {
            "text" => ElementKind::Text(self.parse_text_source(element)?),
            "number" => ElementKind::Number(self.parse_number(element)?),
            "label" => ElementKind::Label(self.parse_label(element)?),
            "names" => ElementKind::Names(self.parse_names(element)?),
            "date" => ElementKind::Date(self.parse_date(element)?),
            "group" => ElementKind::Group(GroupElement {
                delimiter: self.string_attr(element, "delimiter"),
                children: self.parse_children(element)?,
            }),
            "choose" => ElementKind::Choose(self.parse_choose(element)?),
            other => {
                return Err(Error::UnexpectedElement {
                    element: other.to_string(),
                    context: format!("<{}>", context),
                    span: element.name_span,
                });
            }
        };

        Ok(Element {
            kind,
            formatting: self.parse_formatting(element)?,
            span: element.span,
        })
    }

    fn parse_text_source(&self, element: &XmlElement) -> Result<TextSource> {
        if let Some(attr) = element.get_attribute_full("variable") {
            let form = self
                .enum_attr(
                    element,
                    "form",
                    &[("long", VariableForm::Long), ("short", VariableForm::Short)],
                )?
                .unwrap_or_default();
            Ok(TextSource::Variable {
                name: attr.value.clone(),
                form,
            })
        } else if let Some(attr) = element.get_attribute_full("macro") {
            Ok(TextSource::Macro {
                id: self.resolve_macro(attr)?,
                name: attr.value.clone(),
            })
        } else if let Some(term) = element.get_attribute("term") {
            Ok(TextSource::Term {
                name: term.to_string(),
                form: self.parse_term_form(element)?.unwrap_or_default(),
                plural: self.bool_attr(element, "plural")?.unwrap_or(false),
            })
        } else if let Some(value) = element.get_attribute("value") {
            Ok(TextSource::Value(value.to_string()))
        } else {
            Err(Error::MissingTextSource { span: element.span })
        }
    }

    fn parse_number(&self, element: &XmlElement) -> Result<NumberElement> {
        Ok(NumberElement {
            variable: self.require_attr(element, "variable")?.value.clone(),
            form: self
                .enum_attr(
                    element,
                    "form",
                    &[
                        ("numeric", NumberForm::Numeric),
                        ("ordinal", NumberForm::Ordinal),
                        ("long-ordinal", NumberForm::LongOrdinal),
                        ("roman", NumberForm::Roman),
                    ],
                )?
                .unwrap_or_default(),
        })
    }

    fn parse_label_plural(&self, element: &XmlElement) -> Result<LabelPlural> {
        Ok(self
            .enum_attr(
                element,
                "plural",
                &[
                    ("contextual", LabelPlural::Contextual),
                    ("always", LabelPlural::Always),
                    ("never", LabelPlural::Never),
                ],
            )?
            .unwrap_or_default())
    }

    fn parse_label(&self, element: &XmlElement) -> Result<LabelElement> {
        Ok(LabelElement {
            variable: self.require_attr(element, "variable")?.value.clone(),
            form: self.parse_term_form(element)?.unwrap_or_default(),
            plural: self.parse_label_plural(element)?,
        })
    }

    fn parse_names(&mut self, element: &XmlElement) -> Result<NamesElement> {
        let variables: Vec<String> = self
            .require_attr(element, "variable")?
            .value
            .split_whitespace()
            .map(str::to_string)
            .collect();

        let mut names = NamesElement {
            variables,
            delimiter: self.string_attr(element, "delimiter"),
            name: None,
            et_al: None,
            label: None,
            label_before_name: false,
            substitute: None,
        };

        for child in element.all_children() {
            match child.name.as_str() {
                "name" => names.name = Some(self.parse_name(child)?),
                "et-al" => {
                    names.et_al = Some(EtAl {
                        term: self.string_attr(child, "term"),
                        formatting: self.parse_formatting(child)?,
                    });
                }
                "label" => {
                    names.label = Some(NamesLabel {
                        form: self.parse_term_form(child)?.unwrap_or_default(),
                        plural: self.parse_label_plural(child)?,
                        formatting: self.parse_formatting(child)?,
                    });
                    names.label_before_name = names.name.is_none();
                }
                "substitute" => names.substitute = Some(self.parse_children(child)?),
                other => {
                    return Err(Error::UnexpectedElement {
                        element: other.to_string(),
                        context: "<names>".to_string(),
                        span: child.name_span,
                    });
                }
            }
        }

        Ok(names)
    }

    fn parse_name(&self, element: &XmlElement) -> Result<Name> {
        let mut name = Name {
            options: self.parse_name_options(element, false)?,
            formatting: self.parse_formatting(element)?,
            family_formatting: None,
            given_formatting: None,
        };

        for part in element.get_children("name-part") {
            let formatting = self.parse_formatting(part)?;
            match self.require_attr(part, "name")?.value.as_str() {
                "family" => name.family_formatting = Some(formatting),
                "given" => name.given_formatting = Some(formatting),
                other => {
                    return Err(self.invalid_value(
                        part,
                        "name",
                        other,
                        "\"given\" or \"family\"".to_string(),
                    ));
                }
            }
        }

        Ok(name)
    }

    /// Name options. On `<style>`, `<citation>` and `<bibliography>` the
    /// delimiter and form are spelled `name-delimiter` and `name-form`.
    fn parse_name_options(
        &self,
        element: &XmlElement,
        inherited: bool,
    ) -> Result<InheritableNameOptions> {
        let (delimiter_key, form_key) = if inherited {
            ("name-delimiter", "name-form")
        } else {
            ("delimiter", "form")
        };
        let precedes = [
            ("contextual", DelimiterPrecedes::Contextual),
            ("after-inverted-name", DelimiterPrecedes::AfterInvertedName),
            ("always", DelimiterPrecedes::Always),
            ("never", DelimiterPrecedes::Never),
        ];

        Ok(InheritableNameOptions {
            and: self.enum_attr(
                element,
                "and",
                &[("text", NameAnd::Text), ("symbol", NameAnd::Symbol)],
            )?,
            delimiter: self.string_attr(element, delimiter_key),
            delimiter_precedes_last: self.enum_attr(
                element,
                "delimiter-precedes-last",
                &precedes,
            )?,
            delimiter_precedes_et_al: self.enum_attr(
                element,
                "delimiter-precedes-et-al",
                &precedes,
            )?,
            et_al_min: self.u32_attr(element, "et-al-min")?,
            et_al_use_first: self.u32_attr(element, "et-al-use-first")?,
            et_al_use_last: self.bool_attr(element, "et-al-use-last")?,
            initialize: self.bool_attr(element, "initialize")?,
            initialize_with: self.string_attr(element, "initialize-with"),
            form: self.enum_attr(
                element,
                form_key,
                &[
                    ("long", NameForm::Long),
                    ("short", NameForm::Short),
                    ("count", NameForm::Count),
                ],
            )?,
            name_as_sort_order: self.enum_attr(
                element,
                "name-as-sort-order",
                &[("first", NameAsSortOrder::First), ("all", NameAsSortOrder::All)],
            )?,
            sort_separator: self.string_attr(element, "sort-separator"),
        })
    }

    fn parse_date(&self, element: &XmlElement) -> Result<DateElement> {
        Ok(DateElement {
            variable: self.require_attr(element, "variable")?.value.clone(),
            form: self.parse_date_form(element)?,
            date_parts: self
                .enum_attr(
                    element,
                    "date-parts",
                    &[
                        ("year", DatePartsFilter::Year),
                        ("year-month", DatePartsFilter::YearMonth),
                        ("year-month-day", DatePartsFilter::YearMonthDay),
                    ],
                )?
                .unwrap_or_default(),
            parts: self.parse_date_parts(element)?,
            delimiter: self.string_attr(element, "delimiter"),
        })
    }

    fn parse_choose(&mut self, element: &XmlElement) -> Result<ChooseElement> {
        let mut branches = Vec::new();

        for (index, child) in element.all_children().into_iter().enumerate() {
            let is_else = match (child.name.as_str(), index) {
                ("if", 0) => false,
                ("else-if", i) if i > 0 => false,
                ("else", i) if i > 0 => true,
                (other, _) => {
                    return Err(Error::UnexpectedElement {
                        element: other.to_string(),
                        context: "<choose>".to_string(),
                        span: child.name_span,
                    });
                }
            };

            let conditions = if is_else {
                Vec::new()
            } else {
                self.parse_conditions(child)?
            };

            branches.push(ChooseBranch {
                conditions,
                match_type: self
                    .enum_attr(
                        child,
                        "match",
                        &[
                            ("all", MatchType::All),
                            ("any", MatchType::Any),
                            ("none", MatchType::None),
                        ],
                    )?
                    .unwrap_or_default(),
                children: self.parse_children(child)?,
                span: child.span,
            });
        }

        if branches.is_empty() {
            return Err(Error::MissingElement {
                parent: "choose".to_string(),
                element: "if".to_string(),
                span: element.name_span,
            });
        }

        Ok(ChooseElement { branches })
    }

    fn parse_conditions(&self, element: &XmlElement) -> Result<Vec<Condition>> {
        let mut conditions = Vec::new();

        let words = |name: &str| {
            element
                .get_attribute(name)
                .map(|v| v.split_whitespace().map(str::to_string).collect::<Vec<_>>())
                .unwrap_or_default()
        };

        conditions.extend(words("type").into_iter().map(Condition::Type));
        conditions.extend(words("variable").into_iter().map(Condition::Variable));
        conditions.extend(words("is-numeric").into_iter().map(Condition::IsNumeric));
        conditions.extend(
            words("is-uncertain-date")
                .into_iter()
                .map(Condition::IsUncertainDate),
        );
        conditions.extend(words("locator").into_iter().map(Condition::Locator));

        if let Some(attr) = element.get_attribute_full("position") {
            for word in attr.value.split_whitespace() {
                let position = match word {
                    "first" => Position::First,
                    "subsequent" => Position::Subsequent,
                    "ibid-with-locator" => Position::IbidWithLocator,
                    "ibid" => Position::Ibid,
                    "near-note" => Position::NearNote,
                    other => {
                        return Err(Error::InvalidAttributeValue {
                            element: element.name.clone(),
                            attribute: "position".to_string(),
                            value: other.to_string(),
                            expected: "\"first\", \"subsequent\", \"ibid\", \"ibid-with-locator\" or \"near-note\"".to_string(),
                            span: attr.value_span,
                        });
                    }
                };
                conditions.push(Condition::Position(position));
            }
        }

        if let Some(flag) = self.bool_attr(element, "disambiguate")? {
            conditions.push(Condition::Disambiguate(flag));
        }

        if conditions.is_empty() {
            return Err(self.missing_attr(element, "a condition"));
        }

        Ok(conditions)
    }

    fn parse_formatting(&self, element: &XmlElement) -> Result<Formatting> {
        Ok(Formatting {
            font_style: self.enum_attr(
                element,
                "font-style",
                &[
                    ("normal", FontStyle::Normal),
                    ("italic", FontStyle::Italic),
                    ("oblique", FontStyle::Oblique),
                ],
            )?,
            font_variant: self.enum_attr(
                element,
                "font-variant",
                &[
                    ("normal", FontVariant::Normal),
                    ("small-caps", FontVariant::SmallCaps),
                ],
            )?,
            font_weight: self.enum_attr(
                element,
                "font-weight",
                &[
                    ("normal", FontWeight::Normal),
                    ("bold", FontWeight::Bold),
                    ("light", FontWeight::Light),
                ],
            )?,
            text_decoration: self.enum_attr(
                element,
                "text-decoration",
                &[
                    ("none", TextDecoration::None),
                    ("underline", TextDecoration::Underline),
                ],
            )?,
            vertical_align: self.enum_attr(
                element,
                "vertical-align",
                &[
                    ("baseline", VerticalAlign::Baseline),
                    ("sup", VerticalAlign::Sup),
                    ("sub", VerticalAlign::Sub),
                ],
            )?,
            text_case: self.enum_attr(
                element,
                "text-case",
                &[
                    ("lowercase", TextCase::Lowercase),
                    ("uppercase", TextCase::Uppercase),
                    ("capitalize-first", TextCase::CapitalizeFirst),
                    ("capitalize-all", TextCase::CapitalizeAll),
                    ("sentence", TextCase::Sentence),
                    ("title", TextCase::Title),
                ],
            )?,
            prefix: self.string_attr(element, "prefix"),
            suffix: self.string_attr(element, "suffix"),
            display: self.enum_attr(
                element,
                "display",
                &[
                    ("block", Display::Block),
                    ("left-margin", Display::LeftMargin),
                    ("right-inline", Display::RightInline),
                    ("indent", Display::Indent),
                ],
            )?,
            quotes: self.bool_attr(element, "quotes")?.unwrap_or(false),
            strip_periods: self.bool_attr(element, "strip-periods")?.unwrap_or(false),
        })
    }

    // Attribute helpers

    fn require_attr<'a>(&self, element: &'a XmlElement, name: &str) -> Result<&'a XmlAttribute> {
        element
            .get_attribute_full(name)
            .ok_or_else(|| self.missing_attr(element, name))
    }

    fn missing_attr(&self, element: &XmlElement, name: &str) -> Error {
        Error::MissingAttribute {
            element: element.name.clone(),
            attribute: name.to_string(),
            span: element.name_span,
        }
    }

    fn invalid_value(
        &self,
        element: &XmlElement,
        attribute: &str,
        value: &str,
        expected: String,
    ) -> Error {
        let span = element
            .get_attribute_full(attribute)
            .map_or(element.span, |a| a.value_span);
        Error::InvalidAttributeValue {
            element: element.name.clone(),
            attribute: attribute.to_string(),
            value: value.to_string(),
            expected,
            span,
        }
    }

    fn string_attr(&self, element: &XmlElement, name: &str) -> Option<String> {
        element.get_attribute(name).map(str::to_string)
    }

    fn enum_attr<T: Copy>(
        &self,
        element: &XmlElement,
        name: &str,
        choices: &[(&str, T)],
    ) -> Result<Option<T>> {
        let Some(value) = element.get_attribute(name) else {
            return Ok(None);
        };
        match choices.iter().find(|(key, _)| *key == value) {
            Some((_, v)) => Ok(Some(*v)),
            None => {
                let expected = choices
                    .iter()
                    .map(|(key, _)| format!("\"{}\"", key))
                    .collect::<Vec<_>>()
                    .join(", ");
                Err(self.invalid_value(element, name, value, format!("one of {}", expected)))
            }
        }
    }

    fn bool_attr(&self, element: &XmlElement, name: &str) -> Result<Option<bool>> {
        self.enum_attr(element, name, &[("true", true), ("false", false)])
    }

    fn u32_attr(&self, element: &XmlElement, name: &str) -> Result<Option<u32>> {
        match element.get_attribute(name) {
            None => Ok(None),
            Some(value) => value.trim().parse().map(Some).map_err(|_| {
                self.invalid_value(element, name, value, "a non-negative integer".to_string())
            }),
        }
    }
}

fn is_supported_version(version: &str) -> bool {
    let mut parts = version.split('.');
    parts.next() == Some("1")
        && parts.all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

/// Closest defined name within edit distance 3, ignoring case.
fn find_similar_macro<'a>(name: &str, defined: impl Iterator<Item = &'a String>) -> Option<String> {
    let target = name.to_lowercase();
    defined
        .map(|candidate| (levenshtein(&target, &candidate.to_lowercase()), candidate))
        .filter(|(dist, _)| *dist <= 3)
        .min_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(b.1)))
        .map(|(_, candidate)| candidate.clone())
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}
