//! Source-annotated reports for style errors.

use std::ops::Range;
use std::path::Path;

use ariadne::{Color, Config, Label, Report, ReportKind, Source};

/// Render `err` against the style text it came from.
///
/// Errors without a span get a report anchored at the start of the file.
pub fn style_report(path: &Path, source: &str, err: &citeproc_csl::Error, color: bool) -> String {
    let name = path.display().to_string();
    let span = err
        .span()
        .map_or(0..0, |span| char_range(source, span.start..span.end));

    let mut report = Report::build(ReportKind::Error, name.clone(), span.start)
        .with_config(Config::default().with_color(color))
        .with_message(format!("[{}] {}", err.code(), err))
        .with_label(
            Label::new((name.clone(), span))
                .with_message("in this element")
                .with_color(Color::Red),
        );
    if let Some(hint) = err.hint() {
        report = report.with_help(hint);
    }

    let mut out = Vec::new();
    if let Err(e) = report
        .finish()
        .write((name, Source::from(source)), &mut out)
    {
        return format!("[{}] {} ({})", err.code(), err, e);
    }
    String::from_utf8_lossy(&out).into_owned()
}

pub fn eprint_style_error(path: &Path, source: &str, err: &citeproc_csl::Error) {
    eprint!("{}", style_report(path, source, err, true));
}

/// Byte offsets from the parser to the char offsets ariadne counts in.
fn char_range(source: &str, bytes: Range<usize>) -> Range<usize> {
    let to_char = |offset: usize| {
        let offset = offset.min(source.len());
        source
            .char_indices()
            .take_while(|(i, _)| *i < offset)
            .count()
    };
    to_char(bytes.start)..to_char(bytes.end)
}
