//! Stored citation clusters and the positions their order implies.

use citeproc::{Cite, Cluster, InitOptions, OutputFormat, PredefinedLocales, Processor, Reference};

const NOTE_STYLE: &str = r#"<style xmlns="http://purl.org/net/xbiblio/csl" class="note" version="1.0">
  <citation near-note-distance="2">
    <layout suffix=".">
      <choose>
        <if position="ibid-with-locator"><text term="ibid"/><text variable="locator" prefix=", "/></if>
        <else-if position="ibid"><text term="ibid"/></else-if>
        <else-if position="near-note"><text variable="title" form="short"/><text value=" (near)"/></else-if>
        <else-if position="subsequent"><text variable="title" form="short"/></else-if>
        <else><text variable="title"/></else>
      </choose>
    </layout>
  </citation>
</style>"#;

fn processor() -> Processor {
    let mut p = Processor::new(
        InitOptions::new(NOTE_STYLE)
            .format(OutputFormat::Plain)
            .fetcher(PredefinedLocales::bundled_en_us()),
    )
    .unwrap();
    p.insert_reference(
        Reference::new("x", "book")
            .with_variable("title", "The Long Title")
            .with_variable("title-short", "Long"),
    );
    p.insert_reference(
        Reference::new("y", "book")
            .with_variable("title", "Other Work")
            .with_variable("title-short", "Other"),
    );
    p.init_clusters(vec![
        Cluster::new(1, vec![Cite::basic("x")]).with_note_number(1),
        Cluster::new(2, vec![Cite::basic("y")]).with_note_number(2),
        Cluster::new(3, vec![Cite::basic("x")]).with_note_number(3),
    ]);
    p
}

fn rendered(p: &mut Processor) -> Vec<(u32, String)> {
    p.format_clusters()
        .unwrap()
        .into_iter()
        .map(|(id, r)| (id, r.as_str().to_string()))
        .collect()
}

fn pairs(items: &[(u32, &str)]) -> Vec<(u32, String)> {
    items.iter().map(|(id, s)| (*id, s.to_string())).collect()
}

#[test]
fn test_positions_follow_document_order() {
    let mut p = processor();
    assert_eq!(
        rendered(&mut p),
        pairs(&[(1, "The Long Title."), (2, "Other Work."), (3, "Long (near).")])
    );
}

#[test]
fn test_moving_a_cluster_changes_positions() {
    let mut p = processor();
    p.insert_cluster(Cluster::new(3, vec![Cite::basic("x")]).with_note_number(3), Some(2));
    assert_eq!(p.cluster_ids().collect::<Vec<_>>(), vec![1, 3, 2]);
    assert_eq!(
        rendered(&mut p),
        pairs(&[(1, "The Long Title."), (3, "ibid."), (2, "Other Work.")])
    );
}

#[test]
fn test_renumbering_respects_near_note_distance() {
    let mut p = processor();
    p.renumber_clusters(&[(3, 10), (99, 4)]);
    assert_eq!(p.cluster_note_number(3), Some(10));
    assert_eq!(p.cluster_note_number(99), None);
    assert_eq!(p.format_cluster(3).unwrap().unwrap(), "Long.");
}

#[test]
fn test_removing_first_cite_makes_next_one_first() {
    let mut p = processor();
    assert!(p.remove_cluster(1));
    assert!(!p.remove_cluster(1));
    assert_eq!(
        rendered(&mut p),
        pairs(&[(2, "Other Work."), (3, "The Long Title.")])
    );
}

#[test]
fn test_replace_and_append_clusters() {
    let mut p = processor();
    p.replace_cluster(
        Cluster::new(2, vec![Cite::basic("x").with_locator("page", "7")]).with_note_number(2),
    );
    p.insert_cluster(Cluster::new(4, vec![Cite::basic("x")]).with_note_number(4), None);
    assert_eq!(p.cluster_ids().collect::<Vec<_>>(), vec![1, 2, 3, 4]);
    assert_eq!(
        rendered(&mut p),
        pairs(&[
            (1, "The Long Title."),
            (2, "ibid., 7."),
            (3, "Long (near)."),
            (4, "ibid."),
        ])
    );
}

#[test]
fn test_unknown_cluster_formats_to_none() {
    let mut p = processor();
    assert_eq!(p.format_cluster(42).unwrap(), None);
    p.insert_cluster(Cluster::new(5, vec![Cite::basic("y")]), Some(42));
    assert_eq!(p.cluster_ids().last(), Some(5));
}

#[test]
fn test_cluster_with_unknown_reference_fails() {
    let mut p = processor();
    p.replace_cluster(Cluster::new(3, vec![Cite::basic("missing")]));
    assert_eq!(p.format_cluster(3).unwrap_err().code(), "C-3");
    assert!(p.format_clusters().is_err());
}
