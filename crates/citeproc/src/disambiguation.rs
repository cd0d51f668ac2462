//! Disambiguation of cites that render identically.
//!
//! Every stored reference is rendered as a plain first cite. References
//! whose renderings collide are ambiguous, and the methods the style
//! enables run in this order, re-rendering after each one:
//!
//! 1. Given names across the whole store, for every rule but `by-cite`
//! 2. More names from et-al shortened lists
//! 3. Given names within each ambiguous group, for `by-cite`
//! 4. Year suffixes, assigned in bibliography order
//!
//! Whatever is still ambiguous afterwards matches `disambiguate="true"`.

use crate::reference::{Name, Reference};
use citeproc_csl::{DisambiguationStrategy, GivenNameDisambiguationRule};
use std::collections::{HashMap, HashSet};

/// Name variables consulted for name-based disambiguation, by priority.
const NAME_SOURCES: &[&str] = &["author", "composer", "director", "editor", "translator"];

/// How far a name is expanded beyond its style form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NameHint {
    /// Long form, initialized as the style says.
    AddInitials,
    /// Long form with the full given name.
    AddGivenName,
}

/// Disambiguation state of one reference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ItemDisambiguation {
    /// Raised `et-al-use-first`.
    pub et_al_names: Option<u32>,
    name_hints: HashMap<String, NameHint>,
    /// 1 renders as "a".
    pub year_suffix: Option<u32>,
    /// `disambiguate="true"` matches.
    pub condition: bool,
}

impl ItemDisambiguation {
    pub(crate) fn name_hint(&self, name: &Name) -> Option<NameHint> {
        self.name_hints.get(&name_key(name)).copied()
    }

    fn set_hint(&mut self, name: &Name, hint: NameHint) {
        self.name_hints.insert(name_key(name), hint);
    }
}

pub(crate) type DisambiguationTable = HashMap<String, ItemDisambiguation>;

fn name_key(name: &Name) -> String {
    format!(
        "{}|{}|{}",
        name.non_dropping_particle.as_deref().unwrap_or(""),
        name.family.as_deref().or(name.literal.as_deref()).unwrap_or(""),
        name.given.as_deref().unwrap_or("")
    )
}

/// "a" through "z", then "aa", "ab" and so on.
pub(crate) fn year_suffix_letters(mut n: u32) -> String {
    let mut letters = Vec::new();
    while n > 0 {
        n -= 1;
        letters.push(char::from(b'a' + (n % 26) as u8));
        n /= 26;
    }
    letters.iter().rev().collect()
}

/// Run the enabled methods over `references`. `render` renders every
/// reference, in the order given, as a plain citation under a table.
/// `bib_order` is the bibliography order used for year suffixes.
pub(crate) fn disambiguate(
    strategy: DisambiguationStrategy,
    references: &[&Reference],
    bib_order: &[String],
    mut render: impl FnMut(&DisambiguationTable) -> Vec<String>,
) -> DisambiguationTable {
    let mut table = DisambiguationTable::new();
    let names: Vec<&[Name]> = references.iter().map(|r| disamb_names(r)).collect();

    let initial = find_ambiguities(&render(&table));
    let mut groups = initial.clone();

    if let Some(rule) = strategy.add_givenname
        && rule != GivenNameDisambiguationRule::ByCite
    {
        add_given_names_globally(&mut table, references, &names, rule);
        groups = find_ambiguities(&render(&table));
    }

    if strategy.add_names && !groups.is_empty() {
        add_names(&mut table, references, &names, &groups, strategy.add_givenname);
        groups = find_ambiguities(&render(&table));
    }

    // `by-cite` works on the groups as first found.
    if strategy.add_givenname == Some(GivenNameDisambiguationRule::ByCite) && !initial.is_empty() {
        add_given_names_by_cite(&mut table, references, &names, &initial);
        groups = find_ambiguities(&render(&table));
    }

    if strategy.add_year_suffix && !groups.is_empty() {
        assign_year_suffixes(&mut table, references, &groups, bib_order);
        groups = find_ambiguities(&render(&table));
    }

    for group in &groups {
        for &i in group {
            table.entry(references[i].id.clone()).or_default().condition = true;
        }
    }
    tracing::debug!(
        initial = initial.len(),
        remaining = groups.len(),
        "disambiguated citations"
    );
    table
}

fn disamb_names(reference: &Reference) -> &[Name] {
    NAME_SOURCES
        .iter()
        .find_map(|var| reference.names(var))
        .unwrap_or(&[])
}

/// Indices of references rendering the same non-empty text, grouped, in
/// order of first appearance.
fn find_ambiguities(rendered: &[String]) -> Vec<Vec<usize>> {
    let mut by_text: HashMap<&str, usize> = HashMap::new();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for (i, text) in rendered.iter().enumerate() {
        if text.is_empty() {
            continue;
        }
        match by_text.get(text.as_str()) {
            Some(&g) => groups[g].push(i),
            None => {
                by_text.insert(text.as_str(), groups.len());
                groups.push(vec![i]);
            }
        }
    }
    groups.retain(|group| group.len() > 1);
    groups
}

/// Widen the et-al cut for each group one name at a time, until every
/// member differs from the others in the names shown.
fn add_names(
    table: &mut DisambiguationTable,
    references: &[&Reference],
    names: &[&[Name]],
    groups: &[Vec<usize>],
    givenname_rule: Option<GivenNameDisambiguationRule>,
) {
    for group in groups {
        let max_names = group.iter().map(|&i| names[i].len()).max().unwrap_or(0);
        let mut remaining: HashSet<usize> = group.iter().copied().collect();

        for n in 1..=max_names {
            let resolved: Vec<usize> = group
                .iter()
                .copied()
                .filter(|i| remaining.contains(i))
                .filter(|&i| {
                    let own = name_signature(names[i], n, givenname_rule);
                    group
                        .iter()
                        .filter(|&&other| other != i)
                        .all(|&other| name_signature(names[other], n, givenname_rule) != own)
                })
                .collect();
            if resolved.is_empty() {
                continue;
            }
            for &i in &remaining {
                table.entry(references[i].id.clone()).or_default().et_al_names = Some(n as u32);
            }
            for i in resolved {
                remaining.remove(&i);
            }
            if remaining.is_empty() {
                break;
            }
        }
    }
}

/// What of the first `count` names a reader would see once given names
/// are expanded as `rule` allows.
fn name_signature(
    names: &[Name],
    count: usize,
    rule: Option<GivenNameDisambiguationRule>,
) -> Vec<(Option<&str>, Option<String>)> {
    names
        .iter()
        .take(count)
        .enumerate()
        .map(|(i, name)| {
            let given = match rule {
                Some(rule) if rule.primary_only() && i > 0 => None,
                Some(rule) if rule.initials_only() => name.given.as_deref().map(initials),
                Some(_) => name.given.clone(),
                None => None,
            };
            (name.family.as_deref().or(name.literal.as_deref()), given)
        })
        .collect()
}

/// "John Paul", "J.P." and "J. P." all give "J. P.".
fn initials(given: &str) -> String {
    given_words(given)
        .iter()
        .filter_map(|word| word.chars().next())
        .map(|c| format!("{}.", c))
        .collect::<Vec<_>>()
        .join(" ")
}

/// "J.J." and "J. J." compare equal.
fn normalize_given(given: &str) -> String {
    given_words(given)
        .iter()
        .map(|word| {
            if word.chars().count() == 1 {
                format!("{}.", word)
            } else {
                (*word).to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn given_words(given: &str) -> Vec<&str> {
    given
        .split(|c: char| c.is_whitespace() || c == '.')
        .filter(|s| !s.is_empty())
        .collect()
}

/// Every person sharing a family name with a different person anywhere in
/// the store gets initials, or full given names when initials still
/// collide.
fn add_given_names_globally(
    table: &mut DisambiguationTable,
    references: &[&Reference],
    names: &[&[Name]],
    rule: GivenNameDisambiguationRule,
) {
    let mut by_family: HashMap<String, Vec<(usize, &Name)>> = HashMap::new();
    for (i, list) in names.iter().enumerate() {
        let relevant: &[Name] = if rule.primary_only() {
            &list[..list.len().min(1)]
        } else {
            list
        };
        for name in relevant {
            let Some(family) = &name.family else {
                continue;
            };
            let key = match &name.non_dropping_particle {
                Some(particle) => format!("{} {}", particle, family),
                None => family.clone(),
            };
            by_family.entry(key).or_default().push((i, name));
        }
    }

    for group in by_family.values() {
        let unique_initials: HashSet<String> = group
            .iter()
            .filter_map(|(_, n)| n.given.as_deref().map(initials))
            .collect();
        let unique_given: HashSet<String> = group
            .iter()
            .filter_map(|(_, n)| n.given.as_deref().map(normalize_given))
            .collect();
        if unique_initials.len() <= 1 && unique_given.len() <= 1 {
            continue;
        }

        let initials_suffice =
            unique_initials.len() > 1 && unique_initials.len() >= unique_given.len();
        let hint = if initials_suffice {
            NameHint::AddInitials
        } else if !rule.initials_only() && unique_given.len() > 1 {
            NameHint::AddGivenName
        } else {
            continue;
        };
        for (i, name) in group {
            table
                .entry(references[*i].id.clone())
                .or_default()
                .set_hint(name, hint);
        }
    }
}

/// Within each group, expand each name that shares its family name with a
/// different name at the same position in another member.
fn add_given_names_by_cite(
    table: &mut DisambiguationTable,
    references: &[&Reference],
    names: &[&[Name]],
    groups: &[Vec<usize>],
) {
    for group in groups {
        let max_names = group.iter().map(|&i| names[i].len()).max().unwrap_or(0);
        for position in 0..max_names {
            let at_position: Vec<(usize, &Name)> = group
                .iter()
                .filter_map(|&i| names[i].get(position).map(|n| (i, n)))
                .collect();
            for (i, name) in &at_position {
                let rivals: Vec<&Name> = at_position
                    .iter()
                    .map(|(_, other)| *other)
                    .filter(|other| *other != *name && other.family == name.family)
                    .collect();
                if rivals.is_empty() {
                    continue;
                }
                let own = name.given.as_deref().map(initials);
                let initials_suffice = rivals
                    .iter()
                    .all(|other| other.given.as_deref().map(initials) != own);
                let hint = if initials_suffice {
                    NameHint::AddInitials
                } else {
                    NameHint::AddGivenName
                };
                table
                    .entry(references[*i].id.clone())
                    .or_default()
                    .set_hint(name, hint);
            }
        }
    }
}

/// Number each group's members in bibliography order. Members missing
/// from `bib_order` follow, in store order.
fn assign_year_suffixes(
    table: &mut DisambiguationTable,
    references: &[&Reference],
    groups: &[Vec<usize>],
    bib_order: &[String],
) {
    let rank: HashMap<&str, usize> = bib_order
        .iter()
        .enumerate()
        .map(|(rank, id)| (id.as_str(), rank))
        .collect();
    for group in groups {
        let mut members = group.clone();
        members.sort_by_key(|&i| {
            let position = rank.get(references[i].id.as_str()).copied();
            (position.unwrap_or(usize::MAX), i)
        });
        for (suffix, i) in (1u32..).zip(members) {
            table.entry(references[i].id.clone()).or_default().year_suffix = Some(suffix);
        }
    }
}
