//! End-to-end tests for the citation processor.

use citeproc::{
    Cite, CitePosition, DateParts, DateVariable, Error, InitOptions, LocaleFetchError, Name,
    OutputFormat, PredefinedLocales, Processor, Reference,
};
use insta::assert_snapshot;
use std::sync::{Arc, Mutex};

const MINIMAL_EN_US: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<locale xmlns="http://purl.org/net/xbiblio/csl" version="1.0" xml:lang="en-US">
  <terms/>
</locale>"#;

const TITLE_STYLE: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<style xmlns="http://purl.org/net/xbiblio/csl" class="note" version="1.0">
  <citation>
    <layout>
      <text variable="title"/>
    </layout>
  </citation>
</style>"#;

const AUTHOR_DATE: &str = r#"<style xmlns="http://purl.org/net/xbiblio/csl" class="in-text" version="1.0">
  <macro name="author">
    <names variable="author">
      <name name-as-sort-order="all" initialize-with=". " and="symbol" delimiter-precedes-last="always"/>
    </names>
  </macro>
  <macro name="author-short">
    <names variable="author">
      <name form="short" and="symbol"/>
      <substitute><text variable="title"/></substitute>
    </names>
  </macro>
  <citation>
    <sort><key macro="author"/></sort>
    <layout prefix="(" suffix=")" delimiter="; ">
      <group delimiter=" ">
        <text macro="author-short"/>
        <date variable="issued"><date-part name="year"/></date>
      </group>
      <group>
        <label variable="locator" form="short" prefix=", " suffix=" "/>
        <text variable="locator"/>
      </group>
    </layout>
  </citation>
  <bibliography>
    <sort><key macro="author"/></sort>
    <layout suffix=".">
      <text macro="author"/>
      <date variable="issued" prefix=" (" suffix="). "><date-part name="year"/></date>
      <text variable="title" font-style="italic" suffix=". "/>
      <text variable="publisher"/>
    </layout>
  </bibliography>
</style>"#;

fn recording_fetcher(
    answer: impl Fn(&str) -> Result<Option<String>, LocaleFetchError> + Send + Sync + 'static,
) -> (
    impl Fn(&str) -> Result<Option<String>, LocaleFetchError> + Send + Sync + 'static,
    Arc<Mutex<Vec<String>>>,
) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&calls);
    let fetcher = move |lang: &str| {
        recorded.lock().unwrap().push(lang.to_string());
        answer(lang)
    };
    (fetcher, calls)
}

fn processor(style: &str, format: OutputFormat) -> Processor {
    Processor::new(InitOptions::new(style).format(format)).unwrap()
}

fn book(id: &str, family: &str, given: &str, year: i32, title: &str) -> Reference {
    Reference::new(id, "book")
        .with_names("author", vec![Name::personal(family, given)])
        .with_date("issued", DateVariable::single(DateParts::year(year)))
        .with_variable("title", title)
}

#[test]
fn test_end_to_end_note_style_html() {
    let (fetcher, calls) = recording_fetcher(|lang| {
        Ok((lang == "en-US").then(|| MINIMAL_EN_US.to_string()))
    });
    let mut processor = Processor::new(
        InitOptions::new(TITLE_STYLE)
            .format(OutputFormat::Html)
            .fetcher(fetcher),
    )
    .unwrap();

    let id = processor
        .insert_reference_json(r#"{"id":"item","type":"book","title":"the title"}"#)
        .unwrap();
    assert_eq!(id, "item");

    let result = processor.format_one("item").unwrap();
    assert_eq!(result.as_str(), "the title");
    assert_eq!(result.format, OutputFormat::Html);
    assert!(calls.lock().unwrap().contains(&"en-US".to_string()));
}

#[test]
fn test_literal_only_output_is_exact_in_every_format() {
    let style = r#"<style xmlns="http://purl.org/net/xbiblio/csl" class="note" version="1.0">
  <citation><layout><text value="Hello world"/></layout></citation>
</style>"#;
    for format in [OutputFormat::Plain, OutputFormat::Html, OutputFormat::Rtf] {
        let mut p = processor(style, format);
        p.insert_reference(Reference::new("x", "book"));
        assert_eq!(p.format_one("x").unwrap(), "Hello world", "{}", format);
    }
}

#[test]
fn test_literal_output_is_escaped_per_format() {
    let style = r#"<style xmlns="http://purl.org/net/xbiblio/csl" class="note" version="1.0">
  <citation><layout><text value="Café &amp; {Co}"/></layout></citation>
</style>"#;
    let cases = [
        (OutputFormat::Plain, "Café & {Co}"),
        (OutputFormat::Html, "Café &amp; {Co}"),
        (OutputFormat::Rtf, r"Caf\u233? & \{Co\}"),
    ];
    for (format, expected) in cases {
        let mut p = processor(style, format);
        p.insert_reference(Reference::new("x", "book"));
        assert_eq!(p.format_one("x").unwrap(), expected, "{}", format);
    }
}

#[test]
fn test_non_ascii_page_range_is_left_alone() {
    let style = r#"<style xmlns="http://purl.org/net/xbiblio/csl" class="note" version="1.0" page-range-format="minimal">
  <citation><layout><text variable="page"/></layout></citation>
</style>"#;
    let mut p = processor(style, OutputFormat::Plain);
    p.insert_reference_json(r#"{"id":"a","type":"book","page":"१२३-१२५"}"#)
        .unwrap();
    p.insert_reference_json(r#"{"id":"b","type":"book","page":"321-328"}"#)
        .unwrap();
    assert_eq!(p.format_one("a").unwrap(), "१२३-१२५");
    assert_eq!(p.format_one("b").unwrap(), "321–8");
}

#[test]
fn test_extreme_bc_year() {
    let style = r#"<style xmlns="http://purl.org/net/xbiblio/csl" class="note" version="1.0">
  <citation><layout><date variable="issued"><date-part name="year"/></date></layout></citation>
</style>"#;
    let mut p = processor(style, OutputFormat::Plain);
    p.insert_reference_json(r#"{"id":"old","issued":{"date-parts":[[-2147483648]]}}"#)
        .unwrap();
    assert_eq!(p.format_one("old").unwrap(), "2147483648BC");
}

#[test]
fn test_missing_variable_renders_empty_and_suppresses_groups() {
    let style = r#"<style xmlns="http://purl.org/net/xbiblio/csl" class="note" version="1.0">
  <citation><layout>
    <text variable="title"/>
    <group prefix=" [" suffix="]">
      <text value="vol. "/>
      <group delimiter=" "><text value="no."/><text variable="issue"/></group>
    </group>
  </layout></citation>
</style>"#;
    let mut p = processor(style, OutputFormat::Plain);
    p.insert_reference(Reference::new("x", "book").with_variable("title", "Only"));
    assert_eq!(p.format_one("x").unwrap(), "Only");

    p.insert_reference(Reference::new("y", "book"));
    assert_eq!(p.format_one("y").unwrap(), "");

    p.insert_reference(
        Reference::new("z", "book")
            .with_variable("title", "Full")
            .with_variable("issue", "4"),
    );
    assert_eq!(p.format_one("z").unwrap(), "Full [vol. no. 4]");
}

#[test]
fn test_hundred_references_fetch_en_us_once() {
    let (fetcher, calls) = recording_fetcher(|lang| {
        Ok((lang == "en-US").then(|| MINIMAL_EN_US.to_string()))
    });
    let mut p = Processor::new(
        InitOptions::new(TITLE_STYLE)
            .format(OutputFormat::Plain)
            .fetcher(fetcher),
    )
    .unwrap();

    for i in 0..100 {
        let id = format!("ref-{}", i);
        p.insert_reference(Reference::new(id.as_str(), "book").with_variable("title", id.as_str()));
        assert_eq!(p.format_one(&id).unwrap().as_str(), id);
    }

    let calls = calls.lock().unwrap();
    assert_eq!(calls.iter().filter(|lang| *lang == "en-US").count(), 1);
}

#[test]
fn test_declined_exact_locale_falls_back_to_language_and_builtin() {
    let en = r#"<locale xmlns="http://purl.org/net/xbiblio/csl" version="1.0" xml:lang="en">
  <terms><term name="editor">redacteur</term></terms>
</locale>"#;
    let (fetcher, calls) = recording_fetcher(move |lang| {
        Ok(match lang {
            "en" => Some(en.to_string()),
            _ => None,
        })
    });
    let style = r#"<style xmlns="http://purl.org/net/xbiblio/csl" class="note" version="1.0">
  <citation><layout><group delimiter=" "><text term="editor"/><text term="translator"/></group></layout></citation>
</style>"#;
    let mut p = Processor::new(
        InitOptions::new(style)
            .format(OutputFormat::Plain)
            .fetcher(fetcher),
    )
    .unwrap();
    p.insert_reference(Reference::new("x", "book"));

    assert_eq!(p.format_one("x").unwrap(), "redacteur translator");
    assert_eq!(*calls.lock().unwrap(), vec!["en-US", "en"]);

    let locale = p.resolve_locale("en-US").unwrap();
    assert_eq!(
        locale.term_text("editor", citeproc_csl::TermForm::Long, false),
        Some("redacteur")
    );
    assert_eq!(
        locale.term_text("translator", citeproc_csl::TermForm::Long, false),
        Some("translator")
    );
}

#[test]
fn test_formatting_twice_is_identical() {
    let mut p = processor(AUTHOR_DATE, OutputFormat::Html);
    p.insert_reference(book("doe", "Doe", "Jane", 2020, "A Book"));
    p.insert_reference(book("adams", "Adams", "Bea", 1999, "Zebra"));

    let first = p.format_one("doe").unwrap();
    let second = p.format_one("doe").unwrap();
    assert_eq!(first, second);

    let bib1 = p.format_bibliography(None).unwrap();
    let bib2 = p.format_bibliography(None).unwrap();
    assert_eq!(bib1, bib2);
}

#[test]
fn test_removed_reference_is_not_found() {
    let mut p = processor(TITLE_STYLE, OutputFormat::Plain);
    p.insert_reference(Reference::new("gone", "book").with_variable("title", "T"));
    assert!(p.format_one("gone").is_ok());

    assert!(p.remove_reference("gone"));
    assert!(!p.remove_reference("gone"));
    let err = p.format_one("gone").unwrap_err();
    assert!(matches!(err, Error::ReferenceNotFound { ref id } if id == "gone"));
}

#[test]
fn test_malformed_reference_json_leaves_store_unchanged() {
    let mut p = processor(TITLE_STYLE, OutputFormat::Plain);
    p.insert_reference(Reference::new("keep", "book"));
    let err = p.insert_reference_json(r#"{"type":"book"}"#).unwrap_err();
    assert!(matches!(err, Error::MalformedReference { .. }));
    let err = p.insert_reference_json("not json").unwrap_err();
    assert!(matches!(err, Error::MalformedReference { .. }));
    assert_eq!(p.reference_ids().collect::<Vec<_>>(), vec!["keep"]);
}

#[test]
fn test_author_date_citation_cluster() {
    let mut p = processor(AUTHOR_DATE, OutputFormat::Plain);
    p.insert_reference(book("doe", "Doe", "Jane", 2020, "A Book"));
    p.insert_reference(book("adams", "Adams", "Bea", 1999, "Zebra"));
    p.insert_reference(
        Reference::new("anon", "book")
            .with_variable("title", "Beowulf")
            .with_date("issued", DateVariable::single(DateParts::year(1000))),
    );

    let cites = [
        Cite::basic("doe").with_locator("page", "12-15"),
        Cite::basic("adams"),
    ];
    assert_snapshot!(p.format_citation(&cites).unwrap(), @"(Adams 1999; Doe 2020, pp. 12-15)");
    assert_snapshot!(p.format_one("anon").unwrap(), @"(Beowulf 1000)");
}

#[test]
fn test_author_date_bibliography_html() {
    let mut p = processor(AUTHOR_DATE, OutputFormat::Html);
    p.insert_reference(
        Reference::new("doe", "book")
            .with_names(
                "author",
                vec![Name::personal("Doe", "Jane"), Name::personal("Roe", "Richard")],
            )
            .with_date("issued", DateVariable::single(DateParts::year(2020)))
            .with_variable("title", "A Book")
            .with_variable("publisher", "Penguin"),
    );
    p.insert_reference(
        book("adams", "Adams", "Bea", 1999, "Zebra").with_variable("publisher", "Norton"),
    );

    let entries = p.format_bibliography(None).unwrap();
    let ids: Vec<_> = entries.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["adams", "doe"]);

    let text = entries
        .iter()
        .map(|e| e.value.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    assert_snapshot!(text, @r"
    Adams, B. (1999). <i>Zebra</i>. Norton.
    Doe, J., &amp; Roe, R. (2020). <i>A Book</i>. Penguin.
    ");
}

#[test]
fn test_rtf_output() {
    let style = r#"<style xmlns="http://purl.org/net/xbiblio/csl" class="note" version="1.0">
  <citation><layout><text variable="title" font-style="italic"/></layout></citation>
</style>"#;
    let mut p = processor(style, OutputFormat::Rtf);
    p.insert_reference(Reference::new("x", "book").with_variable("title", "Café {x}"));
    assert_snapshot!(p.format_one("x").unwrap(), @r"{\i Caf\u233?\{x\}}");
}

#[test]
fn test_set_format_switches_final_pass() {
    let style = r#"<style xmlns="http://purl.org/net/xbiblio/csl" class="note" version="1.0">
  <citation><layout><text variable="title" font-weight="bold"/></layout></citation>
</style>"#;
    let mut p = processor(style, OutputFormat::Html);
    p.insert_reference(Reference::new("x", "book").with_variable("title", "A & B"));
    assert_eq!(p.format_one("x").unwrap(), "<b>A &amp; B</b>");
    p.set_format(OutputFormat::Plain);
    assert_eq!(p.format_one("x").unwrap(), "A & B");
}

#[test]
fn test_bibliography_sort_ties_keep_request_order() {
    let style = r#"<style xmlns="http://purl.org/net/xbiblio/csl" class="in-text" version="1.0">
  <citation><layout><text variable="title"/></layout></citation>
  <bibliography>
    <sort><key variable="issued"/></sort>
    <layout><text variable="title"/></layout>
  </bibliography>
</style>"#;
    let mut p = processor(style, OutputFormat::Plain);
    let same_year = |id: &str| {
        Reference::new(id, "book")
            .with_variable("title", id)
            .with_date("issued", DateVariable::single(DateParts::year(2000)))
    };
    p.set_references(vec![same_year("c"), same_year("a"), same_year("b")]);

    let all: Vec<_> = p
        .format_bibliography(None)
        .unwrap()
        .into_iter()
        .map(|e| e.id)
        .collect();
    assert_eq!(all, vec!["c", "a", "b"]);

    let requested = vec!["b".to_string(), "c".to_string()];
    let some: Vec<_> = p
        .format_bibliography(Some(&requested))
        .unwrap()
        .into_iter()
        .map(|e| e.id)
        .collect();
    assert_eq!(some, vec!["b", "c"]);
}

#[test]
fn test_citation_numbers_reassigned_after_sort() {
    let style = r#"<style xmlns="http://purl.org/net/xbiblio/csl" class="in-text" version="1.0">
  <citation><layout prefix="[" suffix="]"><text variable="citation-number"/></layout></citation>
  <bibliography>
    <sort><key variable="title"/></sort>
    <layout><text variable="citation-number" suffix=". "/><text variable="title"/></layout>
  </bibliography>
</style>"#;
    let mut p = processor(style, OutputFormat::Plain);
    p.insert_reference(Reference::new("z", "book").with_variable("title", "Zulu"));
    p.insert_reference(Reference::new("a", "book").with_variable("title", "Alpha"));

    let values: Vec<_> = p
        .format_bibliography(None)
        .unwrap()
        .into_iter()
        .map(|e| e.value.into_string())
        .collect();
    assert_eq!(values, vec!["1. Alpha", "2. Zulu"]);
    assert_eq!(p.format_one("z").unwrap(), "[2]");
}

#[test]
fn test_citation_number_only_sort_keeps_numbers() {
    let style = r#"<style xmlns="http://purl.org/net/xbiblio/csl" class="in-text" version="1.0">
  <citation><layout><text variable="citation-number"/></layout></citation>
  <bibliography>
    <sort><key variable="citation-number" sort="descending"/></sort>
    <layout><text variable="citation-number" suffix=". "/><text variable="title"/></layout>
  </bibliography>
</style>"#;
    let mut p = processor(style, OutputFormat::Plain);
    p.insert_reference(Reference::new("one", "book").with_variable("title", "First"));
    p.insert_reference(Reference::new("two", "book").with_variable("title", "Second"));

    let values: Vec<_> = p
        .format_bibliography(None)
        .unwrap()
        .into_iter()
        .map(|e| e.value.into_string())
        .collect();
    assert_eq!(values, vec!["2. Second", "1. First"]);
}

#[test]
fn test_no_bibliography_layout_is_empty() {
    let mut p = processor(TITLE_STYLE, OutputFormat::Plain);
    p.insert_reference(Reference::new("x", "book"));
    assert!(p.format_bibliography(None).unwrap().is_empty());
}

#[test]
fn test_bibliography_unknown_id_fails() {
    let mut p = processor(AUTHOR_DATE, OutputFormat::Plain);
    p.insert_reference(book("doe", "Doe", "Jane", 2020, "A Book"));
    let ids = vec!["doe".to_string(), "nobody".to_string()];
    let err = p.format_bibliography(Some(&ids)).unwrap_err();
    assert_eq!(err.code(), "C-3");
}

#[test]
fn test_ibid_position() {
    let style = r#"<style xmlns="http://purl.org/net/xbiblio/csl" class="note" version="1.0">
  <citation><layout suffix=".">
    <choose>
      <if position="ibid-with-locator"><text term="ibid"/><text variable="locator" prefix=", "/></if>
      <else-if position="ibid"><text term="ibid"/></else-if>
      <else-if position="subsequent"><text variable="title" form="short"/></else-if>
      <else><text variable="title"/></else>
    </choose>
  </layout></citation>
</style>"#;
    let mut p = Processor::new(
        InitOptions::new(style)
            .format(OutputFormat::Plain)
            .fetcher(PredefinedLocales::bundled_en_us()),
    )
    .unwrap();
    p.insert_reference(
        Reference::new("x", "book")
            .with_variable("title", "The Long Title")
            .with_variable("title-short", "Long"),
    );

    let first = Cite::basic("x");
    let later = Cite::basic("x").with_position(CitePosition::Subsequent);
    let ibid = Cite::basic("x").with_position(CitePosition::Ibid);
    let ibid_loc = Cite::basic("x")
        .with_position(CitePosition::IbidWithLocator)
        .with_locator("page", "7");
    assert_eq!(p.format_cite(&first).unwrap(), "The Long Title.");
    assert_eq!(p.format_cite(&later).unwrap(), "Long.");
    assert_eq!(p.format_cite(&ibid).unwrap(), "ibid.");
    assert_eq!(p.format_cite(&ibid_loc).unwrap(), "ibid., 7.");
}

#[test]
fn test_dates_from_json() {
    let style = r#"<style xmlns="http://purl.org/net/xbiblio/csl" class="note" version="1.0">
  <citation><layout><date variable="issued" form="text"/></layout></citation>
</style>"#;
    let mut p = processor(style, OutputFormat::Plain);
    p.insert_reference_json(r#"{"id":"d","issued":{"date-parts":[[2021,3,14]]}}"#)
        .unwrap();
    p.insert_reference_json(r#"{"id":"r","issued":{"raw":"2019-06/2019-07"}}"#)
        .unwrap();
    assert_eq!(p.format_one("d").unwrap(), "March 14, 2021");
    assert_eq!(p.format_one("r").unwrap(), "June–July 2019");
}
