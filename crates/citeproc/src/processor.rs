//! The [`Processor`]: one parsed style, a reference store and a locale
//! cache.

use crate::cite::{Cite, Cluster, ClusterId, assign_positions};
use crate::disambiguation::{DisambiguationTable, disambiguate};
use crate::eval::{EvalContext, Mode, eval_layout};
use crate::format::{OutputFormat, Rendered, render};
use crate::locale::{BUILTIN_LANG, LocaleFetcher, LocaleResolver};
use crate::output::{Output, join_outputs};
use crate::reference::Reference;
use crate::sort::{SortKeys, Sorter};
use crate::{Error, Result};
use citeproc_csl::{DisambiguationStrategy, Formatting, Layout, Locale, Style, parse_style};
use hashlink::LinkedHashMap;
use std::collections::HashMap;
use std::sync::Arc;

/// Everything needed to build a [`Processor`].
pub struct InitOptions {
    style: String,
    format: OutputFormat,
    fetcher: Option<Arc<dyn LocaleFetcher>>,
    locale_override: Option<String>,
}

impl InitOptions {
    pub fn new(style: impl Into<String>) -> Self {
        Self {
            style: style.into(),
            format: OutputFormat::default(),
            fetcher: None,
            locale_override: None,
        }
    }

    pub fn format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Source of locale documents. Without one only the style's inline
    /// locales and the built-in `en-US` terms are available.
    pub fn fetcher(mut self, fetcher: impl LocaleFetcher + 'static) -> Self {
        self.fetcher = Some(Arc::new(fetcher));
        self
    }

    pub fn shared_fetcher(mut self, fetcher: Arc<dyn LocaleFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Render in `lang` instead of the style's `default-locale`.
    pub fn locale_override(mut self, lang: impl Into<String>) -> Self {
        self.locale_override = Some(lang.into());
        self
    }
}

/// One bibliography entry, in bibliography order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BibEntry {
    pub id: String,
    pub value: Rendered,
}

type Numbering = HashMap<String, u32>;

/// Citation processor.
///
/// Formatting calls take `&mut self` because locales are fetched lazily
/// and cached. A failed call leaves the processor as it was.
pub struct Processor {
    style: Arc<Style>,
    format: OutputFormat,
    locales: LocaleResolver,
    /// Insertion order is bibliography order when the style has no sort.
    references: LinkedHashMap<String, Reference>,
    locale_override: Option<String>,
    /// Citation numbers for the whole store, dropped on any store change.
    numbering: Option<Arc<Numbering>>,
    /// Disambiguation of the whole store, dropped with `numbering`.
    disambiguation: Option<Arc<DisambiguationTable>>,
    /// Document order.
    clusters: Vec<Cluster>,
}

impl Processor {
    /// Parse the style and set up an empty store. Fails only with
    /// [`Error::MalformedStyle`]; no locale is fetched yet.
    pub fn new(options: InitOptions) -> Result<Self> {
        let style = parse_style(&options.style)?;
        tracing::debug!(
            class = ?style.class,
            default_locale = ?style.default_locale,
            nodes = style.node_count(),
            "parsed style"
        );
        Ok(Self {
            style: Arc::new(style),
            format: options.format,
            locales: LocaleResolver::new(options.fetcher),
            references: LinkedHashMap::new(),
            locale_override: options.locale_override,
            numbering: None,
            disambiguation: None,
            clusters: Vec::new(),
        })
    }

    pub fn style(&self) -> &Style {
        &self.style
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Switch the final pass. The style is not re-parsed.
    pub fn set_format(&mut self, format: OutputFormat) {
        self.format = format;
    }

    /// Insert or replace a reference. Replacing keeps its position.
    pub fn insert_reference(&mut self, reference: Reference) {
        tracing::trace!(id = %reference.id, "insert reference");
        match self.references.get_mut(&reference.id) {
            Some(existing) => *existing = reference,
            None => {
                self.references.insert(reference.id.clone(), reference);
            }
        }
        self.invalidate();
    }

    /// Parse a CSL-JSON object and insert it. On failure the store is
    /// unchanged.
    pub fn insert_reference_json(&mut self, json: &str) -> Result<String> {
        let reference = Reference::from_json(json)?;
        let id = reference.id.clone();
        self.insert_reference(reference);
        Ok(id)
    }

    /// Replace the whole store.
    pub fn set_references(&mut self, references: impl IntoIterator<Item = Reference>) {
        self.references.clear();
        for reference in references {
            self.insert_reference(reference);
        }
        self.invalidate();
    }

    /// Returns whether the reference was present.
    pub fn remove_reference(&mut self, id: &str) -> bool {
        let removed = self.references.remove(id).is_some();
        tracing::trace!(id = %id, removed, "remove reference");
        if removed {
            self.invalidate();
        }
        removed
    }

    fn invalidate(&mut self) {
        self.numbering = None;
        self.disambiguation = None;
    }

    pub fn get_reference(&self, id: &str) -> Option<&Reference> {
        self.references.get(id)
    }

    /// Ids in insertion order.
    pub fn reference_ids(&self) -> impl Iterator<Item = &str> {
        self.references.keys().map(String::as_str)
    }

    /// Language the processor renders in.
    pub fn locale_lang(&self) -> &str {
        self.locale_override
            .as_deref()
            .or(self.style.default_locale.as_deref())
            .unwrap_or(BUILTIN_LANG)
    }

    /// The merged locale for `lang`, fetching and caching as needed.
    pub fn resolve_locale(&mut self, lang: &str) -> Result<Arc<Locale>> {
        let style = Arc::clone(&self.style);
        self.locales.resolve(lang, &style)
    }

    fn current_locale(&mut self) -> Result<Arc<Locale>> {
        let lang = self.locale_lang().to_string();
        self.resolve_locale(&lang)
    }

    fn reference(&self, id: &str) -> Result<&Reference> {
        self.references
            .get(id)
            .ok_or_else(|| Error::reference_not_found(id))
    }

    /// Replace every cluster. The order given is document order.
    pub fn init_clusters(&mut self, clusters: Vec<Cluster>) {
        tracing::trace!(clusters = clusters.len(), "init clusters");
        self.clusters = clusters;
    }

    /// Place `cluster` before the cluster `before`, or last when `before`
    /// is `None` or unknown. A stored cluster with the same id is moved.
    pub fn insert_cluster(&mut self, cluster: Cluster, before: Option<ClusterId>) {
        self.clusters.retain(|c| c.id != cluster.id);
        let index = match before {
            Some(before) => match self.cluster_index(before) {
                Some(index) => index,
                None => {
                    tracing::warn!(cluster = cluster.id, before, "unknown cluster, appending");
                    self.clusters.len()
                }
            },
            None => self.clusters.len(),
        };
        tracing::trace!(cluster = cluster.id, index, "insert cluster");
        self.clusters.insert(index, cluster);
    }

    /// Swap in new cites and note number, keeping the cluster's place.
    /// An unknown cluster is appended.
    pub fn replace_cluster(&mut self, cluster: Cluster) {
        match self.cluster_index(cluster.id) {
            Some(index) => self.clusters[index] = cluster,
            None => self.clusters.push(cluster),
        }
    }

    /// Returns whether the cluster was present.
    pub fn remove_cluster(&mut self, id: ClusterId) -> bool {
        let len = self.clusters.len();
        self.clusters.retain(|c| c.id != id);
        let removed = self.clusters.len() != len;
        tracing::trace!(cluster = id, removed, "remove cluster");
        removed
    }

    /// Set note numbers. Pairs naming unknown clusters are ignored.
    pub fn renumber_clusters(&mut self, notes: &[(ClusterId, u32)]) {
        for &(id, note) in notes {
            match self.cluster_index(id) {
                Some(index) => self.clusters[index].note_number = Some(note),
                None => tracing::warn!(cluster = id, "renumbering unknown cluster"),
            }
        }
    }

    pub fn cluster_note_number(&self, id: ClusterId) -> Option<u32> {
        self.clusters
            .iter()
            .find(|c| c.id == id)
            .and_then(|c| c.note_number)
    }

    /// Ids in document order.
    pub fn cluster_ids(&self) -> impl Iterator<Item = ClusterId> + '_ {
        self.clusters.iter().map(|c| c.id)
    }

    fn cluster_index(&self, id: ClusterId) -> Option<usize> {
        self.clusters.iter().position(|c| c.id == id)
    }

    /// Format one stored cluster with positions computed from the
    /// clusters before it. `None` for an unknown id.
    pub fn format_cluster(&mut self, id: ClusterId) -> Result<Option<Rendered>> {
        let Some(index) = self.cluster_index(id) else {
            return Ok(None);
        };
        let positioned = assign_positions(&self.clusters[..=index], self.near_note_distance());
        match positioned.last() {
            Some(cites) => self.format_citation(cites).map(Some),
            None => Ok(None),
        }
    }

    /// Format every stored cluster, in document order.
    pub fn format_clusters(&mut self) -> Result<Vec<(ClusterId, Rendered)>> {
        let positioned = assign_positions(&self.clusters, self.near_note_distance());
        let ids: Vec<ClusterId> = self.cluster_ids().collect();
        ids.into_iter()
            .zip(positioned)
            .map(|(id, cites)| Ok((id, self.format_citation(&cites)?)))
            .collect()
    }

    fn near_note_distance(&self) -> u32 {
        self.style.citation_options.near_note_distance
    }

    /// Format a single stored reference as a citation.
    pub fn format_one(&mut self, id: &str) -> Result<Rendered> {
        self.format_cite(&Cite::basic(id))
    }

    pub fn format_cite(&mut self, cite: &Cite) -> Result<Rendered> {
        self.format_citation(std::slice::from_ref(cite))
    }

    /// Format a citation cluster: cites sorted by the citation `<sort>`
    /// if any, joined by the layout delimiter.
    pub fn format_citation(&mut self, cites: &[Cite]) -> Result<Rendered> {
        for cite in cites {
            self.reference(&cite.id)?;
        }
        let locale = self.current_locale()?;
        let numbering = self.store_numbering(&locale);
        let disambiguation = self.store_disambiguation(&locale, &numbering);
        let style = Arc::clone(&self.style);
        let layout = &style.citation;

        let mut items: Vec<(&Cite, &Reference)> = cites
            .iter()
            .map(|cite| self.reference(&cite.id).map(|r| (cite, r)))
            .collect::<Result<_>>()?;

        if let Some(sorter) = Sorter::new(&style, &locale, layout) {
            let keys: Vec<SortKeys> = items
                .iter()
                .map(|(cite, r)| sorter.keys(r, cite, numbering.get(&r.id).copied()))
                .collect();
            let mut order: Vec<usize> = (0..items.len()).collect();
            order.sort_by(|a, b| sorter.compare(&keys[*a], &keys[*b]));
            items = order.into_iter().map(|i| items[i]).collect();
        }

        let outputs = items
            .iter()
            .map(|(cite, reference)| {
                let mut ctx =
                    EvalContext::new(&style, &locale, reference, cite, Mode::Citation, layout)
                        .with_citation_number(numbering.get(&reference.id).copied())
                        .with_disambiguation(disambiguation.get(&reference.id));
                let output = eval_layout(&mut ctx, layout);
                let affixes = Formatting {
                    prefix: cite.prefix.clone(),
                    suffix: cite.suffix.clone(),
                    ..Formatting::default()
                };
                Output::formatted(affixes, vec![output])
            })
            .collect();
        let cluster = join_outputs(outputs, layout.delimiter.as_deref().unwrap_or(""));

        let rendered = self.finish(layout, cluster, &locale);
        tracing::debug!(cites = cites.len(), len = rendered.value.len(), "formatted citation");
        Ok(rendered)
    }

    /// Format bibliography entries for `ids`, or for every stored
    /// reference when `None`. Empty when the style has no bibliography.
    pub fn format_bibliography(&mut self, ids: Option<&[String]>) -> Result<Vec<BibEntry>> {
        let style = Arc::clone(&self.style);
        let Some(layout) = &style.bibliography else {
            return Ok(Vec::new());
        };
        let ids: Vec<String> = match ids {
            Some(ids) => ids.to_vec(),
            None => self.references.keys().cloned().collect(),
        };
        for id in &ids {
            self.reference(id)?;
        }
        let locale = self.current_locale()?;
        let (order, numbering) = self.order_and_number(&ids, &locale);
        let store_numbering = self.store_numbering(&locale);
        let disambiguation = self.store_disambiguation(&locale, &store_numbering);

        let entries = order
            .iter()
            .map(|id| {
                let reference = self.reference(id)?;
                let cite = Cite::basic(id.as_str());
                let mut ctx = EvalContext::new(
                    &style,
                    &locale,
                    reference,
                    &cite,
                    Mode::Bibliography,
                    layout,
                )
                .with_citation_number(numbering.get(id).copied())
                .with_disambiguation(disambiguation.get(id));
                let output = eval_layout(&mut ctx, layout);
                Ok(BibEntry {
                    id: id.clone(),
                    value: self.finish(layout, output, &locale),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        tracing::debug!(entries = entries.len(), "formatted bibliography");
        Ok(entries)
    }

    fn finish(&self, layout: &Layout, output: Output, locale: &Locale) -> Rendered {
        let output = Output::formatted(layout.formatting.clone(), vec![output]);
        Rendered {
            format: self.format,
            value: render(&output, self.format, locale),
        }
    }

    fn store_numbering(&mut self, locale: &Locale) -> Arc<Numbering> {
        if let Some(numbering) = &self.numbering {
            return Arc::clone(numbering);
        }
        let ids: Vec<String> = self.references.keys().cloned().collect();
        let (_, numbering) = self.order_and_number(&ids, locale);
        let numbering = Arc::new(numbering);
        self.numbering = Some(Arc::clone(&numbering));
        numbering
    }

    /// Run disambiguation over the whole store once per store change.
    /// Nothing runs when the style neither enables a method nor tests
    /// `disambiguate`.
    fn store_disambiguation(
        &mut self,
        locale: &Locale,
        numbering: &Numbering,
    ) -> Arc<DisambiguationTable> {
        if let Some(table) = &self.disambiguation {
            return Arc::clone(table);
        }
        let strategy = self.style.citation_options.disambiguation;
        let table = if strategy == DisambiguationStrategy::default()
            && !self.style.tests_disambiguate()
        {
            DisambiguationTable::new()
        } else {
            let ids: Vec<String> = self.references.keys().cloned().collect();
            let (bib_order, _) = self.order_and_number(&ids, locale);
            let references: Vec<&Reference> = self.references.values().collect();
            let style = &*self.style;
            let layout = &style.citation;
            disambiguate(strategy, &references, &bib_order, |table| {
                references
                    .iter()
                    .map(|reference| {
                        let cite = Cite::basic(reference.id.as_str());
                        let mut ctx = EvalContext::new(
                            style,
                            locale,
                            reference,
                            &cite,
                            Mode::Citation,
                            layout,
                        )
                        .with_citation_number(numbering.get(&reference.id).copied())
                        .with_disambiguation(table.get(&reference.id));
                        render(&eval_layout(&mut ctx, layout), OutputFormat::Plain, locale)
                    })
                    .collect()
            })
        };
        let table = Arc::new(table);
        self.disambiguation = Some(Arc::clone(&table));
        table
    }

    /// Bibliography order and citation numbers for `ids`. Numbers start
    /// in request order; after a stable sort they follow the sorted order
    /// unless `citation-number` is the only key.
    fn order_and_number(&self, ids: &[String], locale: &Locale) -> (Vec<String>, Numbering) {
        let initial: Numbering = ids
            .iter()
            .zip(1u32..)
            .map(|(id, n)| (id.clone(), n))
            .collect();

        let sorter = self
            .style
            .bibliography
            .as_ref()
            .and_then(|layout| Sorter::new(&self.style, locale, layout));
        let Some(sorter) = sorter else {
            return (ids.to_vec(), initial);
        };

        let mut keyed: Vec<(SortKeys, &String)> = ids
            .iter()
            .filter_map(|id| {
                let reference = self.references.get(id)?;
                let cite = Cite::basic(id.as_str());
                Some((sorter.keys(reference, &cite, initial.get(id).copied()), id))
            })
            .collect();
        keyed.sort_by(|a, b| sorter.compare(&a.0, &b.0));
        let order: Vec<String> = keyed.into_iter().map(|(_, id)| id.clone()).collect();
        tracing::debug!(
            entries = order.len(),
            renumber = !sorter.by_citation_number_only(),
            "sorted bibliography"
        );

        if sorter.by_citation_number_only() {
            return (order, initial);
        }
        let numbering = order
            .iter()
            .zip(1u32..)
            .map(|(id, n)| (id.clone(), n))
            .collect();
        (order, numbering)
    }
}
