// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Readers and writers for feature files and label declarations
//!
//! Feature files are ARFF (dense or sparse) or CSV with a header row.
//! Label declarations are either the XML label file (`<label name="..."/>`
//! elements, nesting flattened in document order) or plain text with one
//! label name per line.

use crate::datasets::{Attribute, AttributeKind, Instances, LabelMetadata};
use crate::error::{PipelineError, Result};
use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Read a feature file, choosing the parser from the extension
pub fn read_instances(path: &Path, labels: &LabelMetadata) -> Result<Instances> {
    let is_csv = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false);

    if is_csv {
        read_csv(path, labels)
    } else {
        read_arff(path)
    }
}

/// Parse an ARFF file
pub fn read_arff(path: &Path) -> Result<Instances> {
    let file = File::open(path).map_err(|e| PipelineError::io(path, e))?;
    let reader = BufReader::new(file);

    let mut relation = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let mut attributes = Vec::new();
    let mut instances: Option<Instances> = None;

    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| PipelineError::io(path, e))?;
        let line_no = idx + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('%') {
            continue;
        }

        if let Some(data) = instances.as_mut() {
            let row = if trimmed.starts_with('{') {
                parse_sparse_row(trimmed, data.attributes(), line_no)?
            } else {
                parse_dense_row(trimmed, data.attributes(), line_no)?
            };
            data.push(row)?;
            continue;
        }

        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("@relation") {
            relation = unquote(trimmed["@relation".len()..].trim());
        } else if lower.starts_with("@attribute") {
            attributes.push(parse_attribute(trimmed["@attribute".len()..].trim(), line_no)?);
        } else if lower.starts_with("@data") {
            instances = Some(Instances::new(relation.clone(), std::mem::take(&mut attributes))?);
        } else {
            return Err(PipelineError::format(format!(
                "{}:{}: unexpected header line '{}'",
                path.display(),
                line_no,
                trimmed
            )));
        }
    }

    instances.ok_or_else(|| {
        PipelineError::format(format!("{}: missing @data section", path.display()))
    })
}

fn parse_attribute(decl: &str, line_no: usize) -> Result<Attribute> {
    let (name, rest) = split_name(decl);
    if name.is_empty() {
        return Err(PipelineError::format(format!("line {}: attribute without a name", line_no)));
    }
    let rest = rest.trim();

    if rest.starts_with('{') {
        let end = rest.rfind('}').ok_or_else(|| {
            PipelineError::format(format!("line {}: unterminated nominal value list", line_no))
        })?;
        let values = split_quoted(&rest[1..end], ',')
            .into_iter()
            .map(|v| unquote(v.trim()))
            .filter(|v| !v.is_empty())
            .collect();
        return Ok(Attribute::nominal(name, values));
    }

    match rest.to_ascii_lowercase().as_str() {
        "numeric" | "real" | "integer" => Ok(Attribute::numeric(name)),
        other => Err(PipelineError::format(format!(
            "line {}: unsupported attribute type '{}' for '{}'",
            line_no, other, name
        ))),
    }
}

/// Split a possibly quoted leading name from the rest of the declaration
fn split_name(decl: &str) -> (String, &str) {
    let mut chars = decl.char_indices();
    match chars.next() {
        Some((_, q)) if q == '\'' || q == '"' => {
            let mut escaped = false;
            for (i, c) in chars {
                if escaped {
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == q {
                    return (unescape(&decl[1..i]), &decl[i + 1..]);
                }
            }
            (unescape(&decl[1..]), "")
        }
        Some(_) => match decl.find(char::is_whitespace) {
            Some(i) => (decl[..i].to_string(), &decl[i..]),
            None => (decl.to_string(), ""),
        },
        None => (String::new(), ""),
    }
}

fn parse_value(raw: &str, attr: &Attribute, line_no: usize) -> Result<f64> {
    let raw = unquote(raw.trim());
    if raw == "?" {
        return Ok(f64::NAN);
    }
    match &attr.kind {
        AttributeKind::Numeric => raw.parse::<f64>().map_err(|_| {
            PipelineError::format(format!(
                "line {}: '{}' is not numeric (attribute '{}')",
                line_no, raw, attr.name
            ))
        }),
        AttributeKind::Nominal(_) => attr.value_index(&raw).map(|i| i as f64).ok_or_else(|| {
            PipelineError::format(format!(
                "line {}: '{}' is not a declared value of '{}'",
                line_no, raw, attr.name
            ))
        }),
    }
}

fn parse_dense_row(line: &str, attributes: &[Attribute], line_no: usize) -> Result<Vec<f64>> {
    let fields = split_quoted(line, ',');
    if fields.len() != attributes.len() {
        return Err(PipelineError::format(format!(
            "line {}: {} values for {} attributes",
            line_no,
            fields.len(),
            attributes.len()
        )));
    }
    fields
        .iter()
        .zip(attributes)
        .map(|(field, attr)| parse_value(field, attr, line_no))
        .collect()
}

fn parse_sparse_row(line: &str, attributes: &[Attribute], line_no: usize) -> Result<Vec<f64>> {
    let body = line
        .strip_prefix('{')
        .and_then(|l| l.strip_suffix('}'))
        .ok_or_else(|| PipelineError::format(format!("line {}: malformed sparse row", line_no)))?;

    // Omitted entries are 0 (numeric) or the first declared value (nominal)
    let mut row = vec![0.0; attributes.len()];
    for entry in split_quoted(body, ',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }
        let (index, value) = entry.split_once(char::is_whitespace).ok_or_else(|| {
            PipelineError::format(format!("line {}: malformed sparse entry '{}'", line_no, entry))
        })?;
        let index: usize = index.parse().map_err(|_| {
            PipelineError::format(format!("line {}: bad sparse index '{}'", line_no, index))
        })?;
        let attr = attributes.get(index).ok_or_else(|| {
            PipelineError::format(format!("line {}: sparse index {} out of range", line_no, index))
        })?;
        row[index] = parse_value(value, attr, line_no)?;
    }
    Ok(row)
}

/// Split on `sep`, ignoring separators inside single or double quotes
///
/// A backslash inside quotes escapes the next character.
fn split_quoted(line: &str, sep: char) -> Vec<&str> {
    let mut fields = Vec::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in line.char_indices() {
        match quote {
            Some(_) if escaped => escaped = false,
            Some(_) if c == '\\' => escaped = true,
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '\'' || c == '"' => quote = Some(c),
            None if c == sep => {
                fields.push(&line[start..i]);
                start = i + c.len_utf8();
            }
            None => {}
        }
    }
    fields.push(&line[start..]);
    fields
}

fn unquote(value: &str) -> String {
    for q in ['\'', '"'] {
        if value.len() >= 2 && value.starts_with(q) && value.ends_with(q) {
            return unescape(&value[1..value.len() - 1]);
        }
    }
    value.to_string()
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// Parse a CSV feature file; columns named in `labels` become `{0,1}` labels
pub fn read_csv(path: &Path, labels: &LabelMetadata) -> Result<Instances> {
    let file = File::open(path).map_err(|e| PipelineError::io(path, e))?;
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(file);

    let headers = reader
        .headers()
        .map_err(|e| PipelineError::format(format!("{}: bad header: {}", path.display(), e)))?
        .clone();

    let attributes: Vec<Attribute> = headers
        .iter()
        .map(|name| {
            if labels.contains(name) {
                Attribute::binary_label(name)
            } else {
                Attribute::numeric(name)
            }
        })
        .collect();

    let relation = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let mut instances = Instances::new(relation, attributes)?;

    for (idx, record) in reader.records().enumerate() {
        let record = record.map_err(|e| {
            PipelineError::format(format!("{}: record {}: {}", path.display(), idx, e))
        })?;
        // Header is line 1
        let line_no = idx + 2;
        let row = record
            .iter()
            .zip(instances.attributes())
            .map(|(field, attr)| {
                if field.trim().is_empty() {
                    Ok(f64::NAN)
                } else {
                    parse_value(field, attr, line_no)
                }
            })
            .collect::<Result<Vec<f64>>>()?;
        instances.push(row)?;
    }

    Ok(instances)
}

/// Read the label taxonomy
pub fn read_label_declaration(path: &Path) -> Result<LabelMetadata> {
    let content = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;

    let names = if content.trim_start().starts_with('<') {
        xml_label_names(&content)?
    } else {
        content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(str::to_string)
            .collect()
    };

    if names.is_empty() {
        return Err(PipelineError::format(format!(
            "{}: no labels declared",
            path.display()
        )));
    }
    LabelMetadata::new(names)
}

/// Names of every `<label>` element in document order
///
/// Comments, processing instructions, declarations and CDATA sections are
/// skipped. A `<label>` without a `name` attribute is an error.
fn xml_label_names(content: &str) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let mut rest = content;

    while let Some(pos) = rest.find('<') {
        rest = &rest[pos..];

        let skip = [("<!--", "-->"), ("<![CDATA[", "]]>"), ("<?", "?>"), ("<!", ">")]
            .into_iter()
            .find(|(open, _)| rest.starts_with(*open));
        if let Some((open, close)) = skip {
            let end = rest[open.len()..].find(close).ok_or_else(|| {
                PipelineError::format(format!("unterminated '{}' in label declaration", open))
            })?;
            rest = &rest[open.len() + end + close.len()..];
            continue;
        }

        let end = tag_end(rest)
            .ok_or_else(|| PipelineError::format("unterminated tag in label declaration"))?;
        let tag = rest[1..end].trim_end_matches('/');
        rest = &rest[end + 1..];

        let (element, attributes) = match tag.find(char::is_whitespace) {
            Some(i) => (&tag[..i], &tag[i..]),
            None => (tag, ""),
        };
        // Namespace prefixes such as `m:label` are accepted
        if element.rsplit(':').next() != Some("label") {
            continue;
        }
        let name = xml_attribute(attributes, "name")?.ok_or_else(|| {
            PipelineError::format(format!("<{}> element without a name attribute", tag.trim()))
        })?;
        names.push(name);
    }
    Ok(names)
}

/// Offset of the `>` closing the tag at the start of `text`, outside quotes
fn tag_end(text: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (i, c) in text.char_indices() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == '>' => return Some(i),
            None => {}
        }
    }
    None
}

/// Value of attribute `wanted` in `name = "value"` pairs; whitespace around `=` is allowed
fn xml_attribute(attributes: &str, wanted: &str) -> Result<Option<String>> {
    let malformed = || PipelineError::format(format!("malformed attributes '{}'", attributes.trim()));
    let mut rest = attributes.trim_start();

    while !rest.is_empty() {
        let name_end = rest
            .find(|c: char| c == '=' || c.is_whitespace())
            .ok_or_else(malformed)?;
        let name = &rest[..name_end];
        let after = rest[name_end..].trim_start();
        let after = after.strip_prefix('=').ok_or_else(malformed)?.trim_start();

        let quote = after
            .chars()
            .next()
            .filter(|c| *c == '"' || *c == '\'')
            .ok_or_else(malformed)?;
        let value_end = after[1..].find(quote).ok_or_else(malformed)?;
        if name == wanted {
            return Ok(Some(decode_entities(&after[1..1 + value_end])));
        }
        rest = after[value_end + 2..].trim_start();
    }
    Ok(None)
}

fn decode_entities(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Write the label taxonomy as an XML label file
pub fn write_label_declaration(labels: &LabelMetadata, path: &Path) -> Result<()> {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    xml.push_str("<labels xmlns=\"http://mulan.sourceforge.net/labels\">\n");
    for name in labels.names() {
        let escaped = name
            .replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;")
            .replace('"', "&quot;");
        let _ = writeln!(xml, "  <label name=\"{}\"></label>", escaped);
    }
    xml.push_str("</labels>\n");
    std::fs::write(path, xml).map_err(|e| PipelineError::io(path, e))
}

/// Write instances as a dense ARFF file
pub fn write_arff(instances: &Instances, path: &Path) -> Result<()> {
    let file = File::create(path).map_err(|e| PipelineError::io(path, e))?;
    let mut out = BufWriter::new(file);

    let mut header = format!("@relation {}\n\n", quote_if_needed(&instances.relation));
    for attr in instances.attributes() {
        match &attr.kind {
            AttributeKind::Numeric => {
                let _ = writeln!(header, "@attribute {} numeric", quote_if_needed(&attr.name));
            }
            AttributeKind::Nominal(values) => {
                let values: Vec<String> = values.iter().map(|v| quote_if_needed(v)).collect();
                let _ = writeln!(
                    header,
                    "@attribute {} {{{}}}",
                    quote_if_needed(&attr.name),
                    values.join(",")
                );
            }
        }
    }
    header.push_str("\n@data\n");
    out.write_all(header.as_bytes()).map_err(|e| PipelineError::io(path, e))?;

    for row in instances.rows() {
        let fields: Vec<String> = row
            .iter()
            .zip(instances.attributes())
            .map(|(value, attr)| {
                if value.is_nan() {
                    "?".to_string()
                } else if attr.is_numeric() {
                    value.to_string()
                } else {
                    attr.value_label(*value).map(quote_if_needed).unwrap_or_else(|| "?".to_string())
                }
            })
            .collect();
        writeln!(out, "{}", fields.join(",")).map_err(|e| PipelineError::io(path, e))?;
    }

    out.flush().map_err(|e| PipelineError::io(path, e))
}

fn quote_if_needed(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, ',' | '{' | '}' | '%' | '\'' | '"'));
    if needs_quotes {
        format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasets::MultiLabelDataset;

    const ARFF: &str = "% descriptor fold\n\
@relation 'Ehd-Sub0'\n\
\n\
@attribute f0 numeric\n\
@attribute 'f 1' real\n\
@attribute T1 {0,1}\n\
@attribute D1 {0,1}\n\
\n\
@data\n\
0.5,1.25,1,0\n\
?,2,0,1\n\
{0 3.5, 3 1}\n";

    const LABELS_XML: &str = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
<labels xmlns=\"http://mulan.sourceforge.net/labels\">\n\
  <label name=\"T1\"></label>\n\
  <label name=\"D1\"><label name=\"D1a\"></label></label>\n\
</labels>\n";

    #[test]
    fn test_read_arff_dense_and_sparse() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Ehd-Sub0.arff");
        std::fs::write(&path, ARFF).unwrap();

        let instances = read_arff(&path).unwrap();
        assert_eq!(instances.relation, "Ehd-Sub0");
        assert_eq!(instances.num_attributes(), 4);
        assert_eq!(instances.attributes()[1].name, "f 1");
        assert_eq!(instances.num_instances(), 3);
        assert_eq!(instances.rows()[0], vec![0.5, 1.25, 1.0, 0.0]);
        assert!(instances.rows()[1][0].is_nan());
        assert_eq!(instances.rows()[2], vec![3.5, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_read_arff_rejects_bad_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.arff");
        std::fs::write(&path, "@relation r\n@attribute a {0,1}\n@data\n2\n").unwrap();
        assert_eq!(read_arff(&path).unwrap_err().kind(), "FormatError");
    }

    #[test]
    fn test_read_arff_missing_file_is_io_error() {
        let err = read_arff(Path::new("/nonexistent/fold.arff")).unwrap_err();
        assert_eq!(err.kind(), "IOError");
    }

    #[test]
    fn test_xml_label_declaration_flattens_nesting() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.xml");
        std::fs::write(&path, LABELS_XML).unwrap();

        let labels = read_label_declaration(&path).unwrap();
        assert_eq!(labels.names(), &["T1".to_string(), "D1".to_string(), "D1a".to_string()]);
    }

    #[test]
    fn test_plain_label_declaration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.txt");
        std::fs::write(&path, "# taxonomy\nT1\n\nD1\n").unwrap();

        let labels = read_label_declaration(&path).unwrap();
        assert_eq!(labels.names(), &["T1".to_string(), "D1".to_string()]);
    }

    #[test]
    fn test_empty_label_declaration_is_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.txt");
        std::fs::write(&path, "\n").unwrap();
        assert_eq!(read_label_declaration(&path).unwrap_err().kind(), "FormatError");
    }

    #[test]
    fn test_read_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Lbp-Sub1.csv");
        std::fs::write(&path, "f0,T1,f1\n0.5,1,2\n,0,3\n").unwrap();

        let labels = LabelMetadata::new(vec!["T1".into()]).unwrap();
        let instances = read_instances(&path, &labels).unwrap();
        assert_eq!(instances.relation, "Lbp-Sub1");
        assert!(instances.attributes()[1].is_binary_indicator());
        assert_eq!(instances.rows()[0], vec![0.5, 1.0, 2.0]);
        assert!(instances.rows()[1][0].is_nan());
    }

    #[test]
    fn test_written_files_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = MultiLabelDataset::synthetic(&Default::default(), 7).unwrap();

        let arff = dir.path().join("fold.arff");
        let xml = dir.path().join("labels.xml");
        write_arff(dataset.instances(), &arff).unwrap();
        write_label_declaration(dataset.labels(), &xml).unwrap();

        let loaded = MultiLabelDataset::load(&arff, &xml).unwrap();
        assert_eq!(loaded.labels(), dataset.labels());
        assert_eq!(loaded.num_instances(), dataset.num_instances());
        assert_eq!(loaded.label_matrix(), dataset.label_matrix());
        assert_eq!(loaded.features(3), dataset.features(3));
    }

    #[test]
    fn test_split_quoted() {
        assert_eq!(split_quoted("a,'b,c',d", ','), vec!["a", "'b,c'", "d"]);
        assert_eq!(split_quoted(r"'x\',y',z", ','), vec![r"'x\',y'", "z"]);
        assert_eq!(unquote(r"'x\',y'"), "x',y");
    }

    #[test]
    fn test_xml_label_declaration_tolerates_spacing_and_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.xml");
        std::fs::write(
            &path,
            "<?xml version=\"1.0\"?>\n\
<!-- <label name=\"OLD\"/> -->\n\
<labels>\n\
  <label name = \"T1\"></label>\n\
  <label id='x'  name='D1' />\n\
</labels>\n",
        )
        .unwrap();

        let labels = read_label_declaration(&path).unwrap();
        assert_eq!(labels.names(), &["T1".to_string(), "D1".to_string()]);
    }

    #[test]
    fn test_xml_label_without_name_is_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.xml");
        std::fs::write(&path, "<labels><label title=\"T1\"/><label name=\"D1\"/></labels>").unwrap();
        assert_eq!(read_label_declaration(&path).unwrap_err().kind(), "FormatError");

        std::fs::write(&path, "<labels><!-- <label name=\"T1\"/></labels>").unwrap();
        assert_eq!(read_label_declaration(&path).unwrap_err().kind(), "FormatError");
    }

    #[test]
    fn test_quoted_names_with_apostrophes_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quotes.arff");
        let mut instances = Instances::new(
            "it's a fold",
            vec![
                Attribute::numeric("o'clock"),
                Attribute::nominal("kind", vec!["a'b".to_string(), "c\\d e".to_string()]),
            ],
        )
        .unwrap();
        instances.push(vec![1.5, 1.0]).unwrap();
        instances.push(vec![2.0, 0.0]).unwrap();
        write_arff(&instances, &path).unwrap();

        let loaded = read_arff(&path).unwrap();
        assert_eq!(loaded, instances);
    }
}
