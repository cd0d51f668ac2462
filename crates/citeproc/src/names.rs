//! `<names>` rendering.

use crate::disambiguation::NameHint;
use crate::eval::{EvalContext, GroupVars, Mode, eval_element};
use crate::output::{Output, join_outputs};
use crate::reference::Name;
use citeproc_csl::{
    DelimiterPrecedes, DemoteNonDroppingParticle, EtAl, InheritableNameOptions,
    LabelPlural, NameAnd, NameAsSortOrder, NameForm, NamesElement, TermForm,
};

const DEFAULT_DELIMITER: &str = ", ";
const DEFAULT_SORT_SEPARATOR: &str = ", ";

/// One name variable ready to render.
struct NameGroup<'r> {
    variable: &'r str,
    /// Term used for the label; differs from `variable` for the combined
    /// editor and translator.
    term: &'r str,
    names: &'r [Name],
}

pub(crate) fn eval_names<'a>(
    ctx: &mut EvalContext<'a>,
    el: &'a NamesElement,
) -> (Output, GroupVars) {
    let parent = ctx.substitute_parents.last().copied().unwrap_or((None, None));
    let name_el = el.name.as_ref().or(parent.0);
    let et_al_el = el.et_al.as_ref().or(parent.1);

    let mut options = match name_el {
        Some(name) => name.options.merge(&ctx.name_options),
        None => ctx.name_options.clone(),
    };
    if let Some(limits) = ctx.names_override {
        options.et_al_min = limits.min.or(options.et_al_min);
        options.et_al_use_first = limits.use_first.or(options.et_al_use_first);
        options.et_al_use_last = limits.use_last.or(options.et_al_use_last);
    }
    if ctx.mode == Mode::Citation
        && let Some(added) = ctx.disambiguation.and_then(|d| d.et_al_names)
    {
        options.et_al_use_first = Some(options.et_al_use_first.unwrap_or(0).max(added));
    }

    let groups = collect_groups(ctx, el);
    if groups.is_empty() {
        return substitute(ctx, el, (name_el, et_al_el));
    }
    for group in &groups {
        ctx.mark_rendered(group.variable);
        if group.term == "editortranslator" {
            ctx.mark_rendered("translator");
        }
    }

    let renderer = NameRenderer {
        ctx: &*ctx,
        options: &options,
        name_el,
        et_al: et_al_el,
    };

    if options.form == Some(NameForm::Count) {
        let count: usize = groups.iter().map(|g| renderer.shown_count(g.names.len())).sum();
        let output = if count == 0 {
            Output::Null
        } else {
            Output::literal(count.to_string())
        };
        return (output, GroupVars::Important);
    }

    let outputs = groups
        .iter()
        .map(|group| {
            let list = renderer.render_list(group.names);
            let label = renderer.render_label(el, group);
            match (label, el.label_before_name) {
                (Some(label), true) => Output::sequence(vec![label, list]),
                (Some(label), false) => Output::sequence(vec![list, label]),
                (None, _) => list,
            }
        })
        .collect();
    (
        join_outputs(outputs, el.delimiter.as_deref().unwrap_or("")),
        GroupVars::Important,
    )
}

/// Sort key for a name variable used directly as a `<key>`.
pub(crate) fn names_sort_key(ctx: &EvalContext<'_>, variable: &str) -> Option<String> {
    if ctx.is_suppressed(variable) {
        return None;
    }
    let names = ctx.reference.names(variable)?;
    let mut options = ctx.name_options.clone();
    if let Some(limits) = ctx.names_override {
        options.et_al_min = limits.min.or(options.et_al_min);
        options.et_al_use_first = limits.use_first.or(options.et_al_use_first);
        options.et_al_use_last = limits.use_last.or(options.et_al_use_last);
    }
    let renderer = NameRenderer {
        ctx,
        options: &options,
        name_el: None,
        et_al: None,
    };
    Some(renderer.render_list(names).plain_text())
}

fn collect_groups<'r>(ctx: &EvalContext<'r>, el: &'r NamesElement) -> Vec<NameGroup<'r>> {
    let reference = ctx.reference;
    let mut groups: Vec<NameGroup<'r>> = el
        .variables
        .iter()
        .filter(|var| !ctx.is_suppressed(var))
        .filter_map(|var| {
            reference.names(var).map(|names| NameGroup {
                variable: var,
                term: var,
                names,
            })
        })
        .collect();

    let editor = groups.iter().position(|g| g.variable == "editor");
    let translator = groups.iter().position(|g| g.variable == "translator");
    if let (Some(e), Some(t)) = (editor, translator)
        && groups[e].names == groups[t].names
    {
        groups[e].term = "editortranslator";
        groups.remove(t);
    }
    groups
}

/// First child of `<substitute>` that renders anything wins. The
/// substitute inherits this element's `<name>` and `<et-al>`.
fn substitute<'a>(
    ctx: &mut EvalContext<'a>,
    el: &'a NamesElement,
    inherited: (Option<&'a citeproc_csl::Name>, Option<&'a EtAl>),
) -> (Output, GroupVars) {
    let Some(children) = &el.substitute else {
        return (Output::Null, GroupVars::Missing);
    };
    ctx.enter_substitute(inherited);
    let mut result = (Output::Null, GroupVars::Missing);
    for child in children {
        let (output, vars) = eval_element(ctx, *child);
        if !output.is_null() {
            result = (output, vars.neighbour(GroupVars::Important));
            break;
        }
    }
    ctx.leave_substitute();
    result
}

struct NameRenderer<'c, 'a> {
    ctx: &'c EvalContext<'a>,
    options: &'c InheritableNameOptions,
    name_el: Option<&'a citeproc_csl::Name>,
    et_al: Option<&'a EtAl>,
}

impl NameRenderer<'_, '_> {
    fn delimiter(&self) -> &str {
        self.options.delimiter.as_deref().unwrap_or(DEFAULT_DELIMITER)
    }

    /// Number of names shown before "et al.", if et-al applies.
    fn et_al_cut(&self, len: usize) -> Option<usize> {
        let min = self.options.et_al_min? as usize;
        let first = self.options.et_al_use_first? as usize;
        (len >= min && first < len).then_some(first)
    }

    fn shown_count(&self, len: usize) -> usize {
        self.et_al_cut(len).unwrap_or(len)
    }

    fn inverted(&self, index: usize) -> bool {
        if self.ctx.mode == Mode::Sort {
            return true;
        }
        match self.options.name_as_sort_order {
            Some(NameAsSortOrder::All) => true,
            Some(NameAsSortOrder::First) => index == 0,
            None => false,
        }
    }

    fn render_list(&self, names: &[Name]) -> Output {
        let cut = self.et_al_cut(names.len());
        let shown = &names[..cut.unwrap_or(names.len())];
        if shown.is_empty() {
            return Output::Null;
        }
        let rendered: Vec<Output> = shown
            .iter()
            .enumerate()
            .map(|(i, name)| self.render_name(name, i))
            .collect();

        if self.ctx.mode == Mode::Sort {
            return join_outputs(rendered, " ");
        }

        let delimiter = self.delimiter();
        let list = match cut {
            Some(_) if self.options.et_al_use_last == Some(true) && names.len() > shown.len() + 1 => {
                let last = self.render_name(&names[names.len() - 1], names.len() - 1);
                Output::sequence(vec![
                    join_outputs(rendered, delimiter),
                    Output::literal(format!("{}… ", delimiter)),
                    last,
                ])
            }
            Some(_) => {
                let count = rendered.len();
                let before_et_al = self.precedes(
                    self.options.delimiter_precedes_et_al,
                    count,
                    2,
                    self.inverted(count - 1),
                );
                Output::sequence(vec![
                    join_outputs(rendered, delimiter),
                    self.render_et_al(before_et_al),
                ])
            }
            None => self.join_with_and(rendered),
        };
        match self.name_el {
            Some(name) => Output::formatted(name.formatting.clone(), vec![list]),
            None => list,
        }
    }

    /// Separator before "et al." or the last name: the delimiter or a
    /// space, depending on the `delimiter-precedes-*` rule. `contextual`
    /// is the list length from which the contextual rule uses the
    /// delimiter.
    fn precedes(
        &self,
        rule: Option<DelimiterPrecedes>,
        count: usize,
        contextual: usize,
        last_inverted: bool,
    ) -> String {
        let use_delimiter = match rule.unwrap_or_default() {
            DelimiterPrecedes::Contextual => count >= contextual,
            DelimiterPrecedes::AfterInvertedName => last_inverted,
            DelimiterPrecedes::Always => true,
            DelimiterPrecedes::Never => false,
        };
        if use_delimiter {
            self.delimiter().to_string()
        } else {
            " ".to_string()
        }
    }

    fn render_et_al(&self, separator: String) -> Output {
        let term = self.et_al.and_then(|e| e.term.as_deref()).unwrap_or("et-al");
        let text = self
            .ctx
            .locale
            .term_text(term, TermForm::Long, false)
            .unwrap_or("et al.");
        let formatting = self.et_al.map(|e| e.formatting.clone()).unwrap_or_default();
        Output::sequence(vec![
            Output::literal(separator),
            Output::formatted(formatting, vec![Output::literal(text)]),
        ])
    }

    fn join_with_and(&self, mut rendered: Vec<Output>) -> Output {
        if rendered.len() < 2 {
            return Output::sequence(rendered);
        }
        let delimiter = self.delimiter();
        let Some(and) = self.options.and else {
            return join_outputs(rendered, delimiter);
        };
        let and_text = match and {
            NameAnd::Text => self.ctx.locale.term_text("and", TermForm::Long, false),
            NameAnd::Symbol => self.ctx.locale.term_text("and", TermForm::Symbol, false),
        }
        .unwrap_or("&");

        let count = rendered.len();
        let last = rendered.pop().unwrap_or(Output::Null);
        let separator = self.precedes(
            self.options.delimiter_precedes_last,
            count,
            3,
            self.inverted(count - 2),
        );
        Output::sequence(vec![
            join_outputs(rendered, delimiter),
            Output::literal(format!("{}{} ", separator, and_text)),
            last,
        ])
    }

    fn render_label(&self, el: &NamesElement, group: &NameGroup<'_>) -> Option<Output> {
        if self.ctx.mode == Mode::Sort {
            return None;
        }
        let label = el.label.as_ref()?;
        let plural = match label.plural {
            LabelPlural::Always => true,
            LabelPlural::Never => false,
            LabelPlural::Contextual => group.names.len() > 1,
        };
        let text = self.ctx.locale.term_text(group.term, label.form, plural)?;
        Some(Output::formatted(
            label.formatting.clone(),
            vec![Output::literal(text)],
        ))
    }

    fn render_name(&self, name: &Name, index: usize) -> Output {
        let family_fmt = self
            .name_el
            .and_then(|n| n.family_formatting.clone())
            .unwrap_or_default();
        let given_fmt = self
            .name_el
            .and_then(|n| n.given_formatting.clone())
            .unwrap_or_default();

        if let Some(literal) = name.as_literal() {
            return Output::formatted(family_fmt, vec![Output::literal(literal)]);
        }

        let hint = self.hint(name);
        let parts = self.name_parts(name, hint);

        if self.ctx.mode == Mode::Sort {
            return Output::literal(parts.sort_key(self.demote()));
        }

        let family = |demoted: bool| {
            Output::formatted(
                family_fmt.clone(),
                vec![Output::literal(parts.family_chunk(demoted))],
            )
        };
        let given = |demoted: bool| {
            Output::formatted(
                given_fmt.clone(),
                vec![Output::literal(parts.given_chunk(demoted))],
            )
        };

        if self.options.form == Some(NameForm::Short) && hint.is_none() {
            return family(false);
        }

        if is_cjk(&parts.family) {
            return Output::sequence(vec![family(false), given(false)]);
        }

        if self.inverted(index) {
            let demoted = self.demote() == DemoteNonDroppingParticle::DisplayAndSort;
            let separator = self
                .options
                .sort_separator
                .as_deref()
                .unwrap_or(DEFAULT_SORT_SEPARATOR);
            let mut out = vec![family(demoted)];
            let given = given(demoted);
            if !given.is_null() {
                out.push(Output::literal(separator));
                out.push(given);
            }
            if let Some(suffix) = &parts.suffix {
                out.push(Output::literal(format!("{}{}", separator, suffix)));
            }
            return Output::sequence(out);
        }

        let mut out = Vec::new();
        let given = given(false);
        if !given.is_null() {
            out.push(given);
            out.push(Output::literal(" "));
        }
        out.push(family(false));
        if let Some(suffix) = &parts.suffix {
            let separator = if name.comma_suffix == Some(true) { ", " } else { " " };
            out.push(Output::literal(format!("{}{}", separator, suffix)));
        }
        Output::sequence(out)
    }

    fn demote(&self) -> DemoteNonDroppingParticle {
        self.ctx.style.options.demote_non_dropping_particle
    }

    /// Expansion assigned to this name for a citation.
    fn hint(&self, name: &Name) -> Option<NameHint> {
        if self.ctx.mode != Mode::Citation {
            return None;
        }
        self.ctx.disambiguation?.name_hint(name)
    }

    fn name_parts(&self, name: &Name, hint: Option<NameHint>) -> NameParts {
        let given = name.given.as_deref().unwrap_or("");
        let initialize = self.ctx.mode != Mode::Sort && hint != Some(NameHint::AddGivenName);
        let given = match (&self.options.initialize_with, self.options.initialize) {
            (Some(with), None | Some(true)) if initialize => initialize_given(
                given,
                with,
                self.ctx.style.options.initialize_with_hyphen,
            ),
            _ => given.to_string(),
        };
        NameParts {
            family: name.family.clone().unwrap_or_default(),
            given,
            dropping: name.dropping_particle.clone(),
            non_dropping: name.non_dropping_particle.clone(),
            suffix: name.suffix.clone(),
        }
    }
}

struct NameParts {
    family: String,
    given: String,
    dropping: Option<String>,
    non_dropping: Option<String>,
    suffix: Option<String>,
}

impl NameParts {
    /// `[non-dropping-particle ]family`, without the particle if it is
    /// demoted to the given chunk.
    fn family_chunk(&self, demoted: bool) -> String {
        match &self.non_dropping {
            Some(particle) if !demoted => join_particle(particle, &self.family),
            _ => self.family.clone(),
        }
    }

    /// `given[ dropping-particle][ non-dropping-particle]`.
    fn given_chunk(&self, demoted: bool) -> String {
        let mut out = self.given.clone();
        let mut push = |word: &str| {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(word);
        };
        if let Some(particle) = &self.dropping {
            push(particle);
        }
        if demoted && let Some(particle) = &self.non_dropping {
            push(particle);
        }
        out
    }

    fn sort_key(&self, demote: DemoteNonDroppingParticle) -> String {
        let mut words: Vec<&str> = Vec::new();
        if demote == DemoteNonDroppingParticle::Never
            && let Some(particle) = &self.non_dropping
        {
            words.push(particle);
        }
        words.push(&self.family);
        if let Some(particle) = &self.dropping {
            words.push(particle);
        }
        if demote != DemoteNonDroppingParticle::Never
            && let Some(particle) = &self.non_dropping
        {
            words.push(particle);
        }
        words.push(&self.given);
        if let Some(suffix) = &self.suffix {
            words.push(suffix);
        }
        words
            .into_iter()
            .filter(|w| !w.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Particles ending in an apostrophe or hyphen attach without a space
/// ("d'Artagnan").
fn join_particle(particle: &str, family: &str) -> String {
    if particle.ends_with(['\'', '’', '-']) {
        format!("{}{}", particle, family)
    } else {
        format!("{} {}", particle, family)
    }
}

fn is_cjk(text: &str) -> bool {
    !text.is_empty()
        && text.chars().all(|c| {
            matches!(c,
                '\u{3040}'..='\u{30FF}' | '\u{3400}'..='\u{4DBF}' | '\u{4E00}'..='\u{9FFF}'
                | '\u{AC00}'..='\u{D7AF}' | '\u{F900}'..='\u{FAFF}')
        })
}

/// Reduce given names to initials followed by `with`. With `hyphen`,
/// hyphenated names keep the hyphen between initials ("J.-P.").
pub(crate) fn initialize_given(given: &str, with: &str, hyphen: bool) -> String {
    let compact = with.trim_end();
    let trailing = &with[compact.len()..];
    let mut out = String::new();
    for word in given.split_whitespace() {
        let initials: Vec<String> = word
            .split('-')
            .filter_map(|part| part.chars().next())
            .map(|c| c.to_uppercase().collect())
            .collect();
        if hyphen {
            let joined: Vec<String> = initials.iter().map(|i| format!("{}{}", i, compact)).collect();
            out.push_str(&joined.join("-"));
            out.push_str(trailing);
        } else {
            for initial in initials {
                out.push_str(&initial);
                out.push_str(with);
            }
        }
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cite::Cite;
    use crate::eval::{EvalContext, Mode, eval_layout};
    use crate::format::{OutputFormat, render};
    use crate::locale::builtin_locale;
    use crate::reference::Reference;
    use citeproc_csl::{Style, parse_style};

    fn style(names: &str, attrs: &str) -> Style {
        parse_style(&format!(
            r#"<style xmlns="http://purl.org/net/xbiblio/csl" version="1.0" class="in-text" {}>
  <citation><layout>{}</layout></citation>
</style>"#,
            attrs, names
        ))
        .unwrap()
    }

    fn render_with(style: &Style, reference: &Reference, mode: Mode) -> String {
        let locale = builtin_locale();
        let cite = Cite::basic(reference.id.clone());
        let mut ctx = EvalContext::new(style, locale, reference, &cite, mode, &style.citation);
        let output = eval_layout(&mut ctx, &style.citation);
        render(&output, OutputFormat::Plain, locale)
    }

    fn names_of(n: usize) -> Vec<Name> {
        ["Smith", "Jones", "Brown", "Lee", "Khan"]
            .iter()
            .take(n)
            .map(|family| Name::personal(family, "Ann"))
            .collect()
    }

    fn with_authors(n: usize) -> Reference {
        Reference::new("r", "book").with_names("author", names_of(n))
    }

    #[test]
    fn test_initialize_given() {
        assert_eq!(initialize_given("John Ronald", ". ", true), "J. R.");
        assert_eq!(initialize_given("John Ronald", ".", true), "J.R.");
        assert_eq!(initialize_given("Jean-Paul", ".", true), "J.-P.");
        assert_eq!(initialize_given("Jean-Paul", ".", false), "J.P.");
    }

    #[test]
    fn test_and_and_delimiter_precedes_last() {
        let s = style(r#"<names variable="author"><name and="text"/></names>"#, "");
        assert_eq!(render_with(&s, &with_authors(2), Mode::Citation), "Ann Smith and Ann Jones");
        assert_eq!(
            render_with(&s, &with_authors(3), Mode::Citation),
            "Ann Smith, Ann Jones, and Ann Brown"
        );
        let never = style(
            r#"<names variable="author"><name and="symbol" delimiter-precedes-last="never"/></names>"#,
            "",
        );
        assert_eq!(
            render_with(&never, &with_authors(3), Mode::Citation),
            "Ann Smith, Ann Jones & Ann Brown"
        );
    }

    #[test]
    fn test_et_al_truncation() {
        let s = style(
            r#"<names variable="author"><name form="short" et-al-min="3" et-al-use-first="1"/></names>"#,
            "",
        );
        assert_eq!(render_with(&s, &with_authors(2), Mode::Citation), "Smith, Jones");
        assert_eq!(render_with(&s, &with_authors(4), Mode::Citation), "Smith et al.");
    }

    #[test]
    fn test_et_al_use_last() {
        let s = style(
            r#"<names variable="author"><name form="short" et-al-min="4" et-al-use-first="2" et-al-use-last="true"/></names>"#,
            "",
        );
        assert_eq!(
            render_with(&s, &with_authors(5), Mode::Citation),
            "Smith, Jones, … Khan"
        );
    }

    #[test]
    fn test_name_as_sort_order_with_initials() {
        let s = style(
            r#"<names variable="author"><name name-as-sort-order="first" initialize-with=". " and="text"/></names>"#,
            "",
        );
        let reference = Reference::new("r", "book").with_names(
            "author",
            vec![Name::personal("Doe", "John Ronald"), Name::personal("Roe", "Jane")],
        );
        assert_eq!(render_with(&s, &reference, Mode::Citation), "Doe, J. R. and J. Roe");
    }

    #[test]
    fn test_particles_and_demotion() {
        let name = Name {
            family: Some("Beethoven".into()),
            given: Some("Ludwig".into()),
            non_dropping_particle: Some("van".into()),
            ..Name::default()
        };
        let reference = Reference::new("r", "book").with_names("author", vec![name]);
        let display = style(r#"<names variable="author"/>"#, "");
        assert_eq!(render_with(&display, &reference, Mode::Citation), "Ludwig van Beethoven");
        let inverted = style(r#"<names variable="author"><name name-as-sort-order="all"/></names>"#, "");
        assert_eq!(render_with(&inverted, &reference, Mode::Citation), "van Beethoven, Ludwig");
        let demoted = style(
            r#"<names variable="author"><name name-as-sort-order="all"/></names>"#,
            r#"demote-non-dropping-particle="display-and-sort""#,
        );
        assert_eq!(render_with(&demoted, &reference, Mode::Citation), "Beethoven, Ludwig van");
        assert_eq!(render_with(&display, &reference, Mode::Sort), "Beethoven van Ludwig");
    }

    #[test]
    fn test_literal_and_count() {
        let reference = Reference::new("r", "report")
            .with_names("author", vec![Name::literal("World Health Organization")]);
        let s = style(r#"<names variable="author"/>"#, "");
        assert_eq!(render_with(&s, &reference, Mode::Citation), "World Health Organization");
        let count = style(r#"<names variable="author"><name form="count"/></names>"#, "");
        assert_eq!(render_with(&count, &with_authors(3), Mode::Citation), "3");
    }

    #[test]
    fn test_label_after_names() {
        let s = style(
            r#"<names variable="editor"><name form="short"/><label form="short" prefix=" (" suffix=")"/></names>"#,
            "",
        );
        let reference = Reference::new("r", "book").with_names("editor", names_of(2));
        assert_eq!(render_with(&s, &reference, Mode::Citation), "Smith, Jones (eds.)");
    }

    #[test]
    fn test_editor_translator_combined() {
        let s = style(
            r#"<names variable="editor translator" delimiter="; "><name form="short"/><label form="short" prefix=", "/></names>"#,
            "",
        );
        let same = Reference::new("r", "book")
            .with_names("editor", names_of(1))
            .with_names("translator", names_of(1));
        assert_eq!(render_with(&s, &same, Mode::Citation), "Smith, ed. & tran.");
    }

    #[test]
    fn test_substitute_suppresses_variable() {
        let s = style(
            r#"<names variable="author"><substitute><names variable="editor"/><text variable="title"/></substitute></names><text prefix=" / " variable="title"/>"#,
            "",
        );
        let untitled = Reference::new("r", "book").with_variable("title", "Anon Work");
        assert_eq!(render_with(&s, &untitled, Mode::Citation), "Anon Work");
        let edited = untitled.clone().with_names("editor", names_of(1));
        assert_eq!(render_with(&s, &edited, Mode::Citation), "Ann Smith / Anon Work");
    }
}
