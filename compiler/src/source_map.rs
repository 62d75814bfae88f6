//! Source map v3 generation.
//!
//! The formatter records one [`Mapping`] per chunk it writes for a source
//! position. Generated positions are 0-based; parser positions are 1-based
//! and are shifted when recorded.

use std::collections::HashMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;

const VLQ_BASE_SHIFT: u32 = 5;
const VLQ_BASE: i64 = 1 << VLQ_BASE_SHIFT;
const VLQ_BASE_MASK: i64 = VLQ_BASE - 1;
const VLQ_CONTINUATION_BIT: i64 = VLQ_BASE;
const BASE64_DIGITS: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapping {
    pub generated_line: usize,
    pub generated_column: usize,
    pub file_id: usize,
    pub original_line: usize,
    pub original_column: usize,
}

/// Append the base64 VLQ encoding of `value` to `out`.
pub fn encode_vlq(value: i64, out: &mut String) {
    let mut vlq = if value < 0 { ((-value) << 1) | 1 } else { value << 1 };
    loop {
        let mut digit = vlq & VLQ_BASE_MASK;
        vlq >>= VLQ_BASE_SHIFT;
        if vlq > 0 {
            digit |= VLQ_CONTINUATION_BIT;
        }
        out.push(BASE64_DIGITS[digit as usize] as char);
        if vlq == 0 {
            break;
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SourceMapJson<'a> {
    version: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    file: Option<&'a str>,
    source_root: &'a str,
    sources: Vec<String>,
    names: Vec<String>,
    mappings: String,
}

#[derive(Debug, Default)]
pub struct SourceMapBuilder {
    mappings: Vec<Mapping>,
}

impl SourceMapBuilder {
    pub fn new() -> Self {
        SourceMapBuilder::default()
    }

    /// Record that output at (`generated_line`, `generated_column`) came from
    /// the 1-based `line`/`column` of `file_id`.
    pub fn add(&mut self, generated_line: usize, generated_column: usize, file_id: usize, line: usize, column: usize) {
        let mapping = Mapping {
            generated_line,
            generated_column,
            file_id,
            original_line: line.saturating_sub(1),
            original_column: column.saturating_sub(1),
        };
        if self.mappings.last() != Some(&mapping) {
            self.mappings.push(mapping);
        }
    }

    pub fn mappings(&self) -> &[Mapping] {
        &self.mappings
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Encode the mappings, numbering sources in order of first use.
    /// Returns the `mappings` string and the file ids of the sources.
    fn encode(&self) -> (String, Vec<usize>) {
        let mut source_index: HashMap<usize, i64> = HashMap::new();
        let mut sources = Vec::new();
        let mut out = String::new();

        let mut line = 0;
        let mut prev_column = 0i64;
        let mut prev_source = 0i64;
        let mut prev_line = 0i64;
        let mut prev_orig_column = 0i64;
        let mut first_in_line = true;

        for mapping in &self.mappings {
            while line < mapping.generated_line {
                out.push(';');
                line += 1;
                prev_column = 0;
                first_in_line = true;
            }
            if !first_in_line {
                out.push(',');
            }
            first_in_line = false;

            let next = source_index.len() as i64;
            let source = *source_index.entry(mapping.file_id).or_insert_with(|| {
                sources.push(mapping.file_id);
                next
            });

            encode_vlq(mapping.generated_column as i64 - prev_column, &mut out);
            encode_vlq(source - prev_source, &mut out);
            encode_vlq(mapping.original_line as i64 - prev_line, &mut out);
            encode_vlq(mapping.original_column as i64 - prev_orig_column, &mut out);

            prev_column = mapping.generated_column as i64;
            prev_source = source;
            prev_line = mapping.original_line as i64;
            prev_orig_column = mapping.original_column as i64;
        }
        (out, sources)
    }

    /// The v3 JSON document. `source_name` maps a file id to the name listed
    /// in `sources`.
    pub fn to_json(
        &self,
        file: Option<&str>,
        source_root: &str,
        source_name: impl Fn(usize) -> String,
    ) -> Result<String, serde_json::Error> {
        let (mappings, ids) = self.encode();
        let map = SourceMapJson {
            version: 3,
            file,
            source_root,
            sources: ids.into_iter().map(source_name).collect(),
            names: Vec::new(),
            mappings,
        };
        serde_json::to_string(&map)
    }
}

/// `sourceMappingURL` comment pointing at `url`.
pub fn url_comment(url: &str) -> String {
    format!("/*# sourceMappingURL={} */", url)
}

/// `sourceMappingURL` comment embedding `json` as a data URL.
pub fn inline_comment(json: &str) -> String {
    url_comment(&format!(
        "data:application/json;charset=utf-8;base64,{}",
        STANDARD.encode(json)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vlq(value: i64) -> String {
        let mut out = String::new();
        encode_vlq(value, &mut out);
        out
    }

    #[test]
    fn vlq_digits() {
        assert_eq!(vlq(0), "A");
        assert_eq!(vlq(1), "C");
        assert_eq!(vlq(-1), "D");
        assert_eq!(vlq(15), "e");
        assert_eq!(vlq(16), "gB");
        assert_eq!(vlq(123), "2H");
    }

    #[test]
    fn mappings_are_relative() {
        let mut builder = SourceMapBuilder::new();
        builder.add(0, 0, 7, 1, 1);
        builder.add(0, 4, 7, 1, 5);
        builder.add(2, 2, 7, 2, 3);
        let json = builder.to_json(Some("out.css"), "", |_| "in.scss".to_string()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["version"], 3);
        assert_eq!(parsed["sources"][0], "in.scss");
        assert_eq!(parsed["mappings"], "AAAA,IAAI;;EACF");
    }

    #[test]
    fn inline_maps_are_base64() {
        let comment = inline_comment("{}");
        assert_eq!(comment, "/*# sourceMappingURL=data:application/json;charset=utf-8;base64,e30= */");
    }
}
