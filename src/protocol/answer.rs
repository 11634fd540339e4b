//! Decoders for the SHSWorks answer grammar.
//!
//! An answer line is pipe-delimited: a fixed header (`Stop`, the echoed job
//! id, echoed operation metadata, the error-code token) followed by the
//! operation-specific payload fields:
//!
//! ```text
//! Stop|JID=001|OP=;ST=;SN=|1=Ok|<payload>\r\n
//! ```
//!
//! The session engine validates the header (error code, unknown-command and
//! busy markers) before any of these decoders run; everything here is a pure
//! function of the already-validated answer string. Empty list payloads
//! decode to empty collections — distinguishing "feature disabled" from
//! "nothing selected" requires a second round trip and lives in the client
//! layer, not here.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::{Result, ShsError};
use crate::models::{CamSettings, Evaluation, FieldStats, Number, ParamValue};

/// Parameters that always decode as opaque strings.
const STRING_PARAMS: [&str; 3] = ["cpOperator", "cpSampleSerialNumber", "cpSampleType"];

/// Parameters that always decode as filesystem paths.
const PATH_PARAMS: [&str; 2] = ["cpAPP_ImgProc_DXFFile", "cpRAYFile"];

/// Number of numeric fields in a statistics block, in protocol order.
const STATS_FIELD_COUNT: usize = 9;

/// Split an answer into its pipe-delimited fields, CRLF stripped.
pub fn split_answer(answer: &str) -> Vec<&str> {
    answer.trim_end_matches(['\r', '\n']).split('|').collect()
}

/// The payload fields: everything after the error-code token (index 3).
fn payload_fields(answer: &str) -> Result<Vec<&str>> {
    let fields = split_answer(answer);
    if fields.len() < 5 {
        return Err(ShsError::UnexpectedFormat(format!(
            "answer carries no payload field: {answer:?}"
        )));
    }
    Ok(fields[4..].to_vec())
}

/// The bare trailing payload token (version strings, single values).
pub fn result_field(answer: &str) -> Result<String> {
    let fields = payload_fields(answer)?;
    // payload_fields guarantees at least one entry
    Ok(fields[fields.len() - 1].to_string())
}

/// Decode the trailing payload field as a single number.
pub fn read_number(answer: &str) -> Result<Number> {
    Number::parse(&result_field(answer)?)
}

/// Decode the trailing payload field as a whitespace-separated number list.
///
/// An empty payload yields an empty list, not an error: several "get"
/// operations answer with nothing when the feature they report on is
/// disabled.
pub fn read_numbers(answer: &str) -> Result<Vec<Number>> {
    result_field(answer)?
        .split_whitespace()
        .map(Number::parse)
        .collect()
}

/// Decode the trailing payload field as a semicolon-separated string list.
///
/// Same empty-payload convention as [`read_numbers`]. Semicolons rather than
/// whitespace because pass/fail item names may contain spaces.
pub fn read_list(answer: &str) -> Result<Vec<String>> {
    Ok(result_field(answer)?
        .split(';')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect())
}

/// Decode the trailing payload field as a boolean flag.
pub fn read_bool(answer: &str) -> Result<bool> {
    match result_field(answer)?.as_str() {
        "0" => Ok(false),
        "1" => Ok(true),
        other => Err(ShsError::UnexpectedFormat(format!(
            "expected a 0/1 flag, got {other:?}"
        ))),
    }
}

/// Decode camera settings: one payload field per camera group, each of the
/// form `GROUP:KEY=VALUE;KEY=VALUE;...`.
///
/// The SHS group is always present; a VCC group appears when a vision
/// control camera is fitted. Per-field numeric typing is preserved, so
/// `AVE=8` decodes as an integer and `GAI=1.0` as a float.
pub fn read_cam_settings(answer: &str) -> Result<CamSettings> {
    let mut groups = CamSettings::new();
    for field in payload_fields(answer)? {
        if field.is_empty() {
            continue;
        }
        let (group, pairs) = field.split_once(':').ok_or_else(|| {
            ShsError::UnexpectedFormat(format!(
                "camera settings group without a label: {field:?}"
            ))
        })?;
        let mut settings = BTreeMap::new();
        for pair in pairs.split(';').filter(|pair| !pair.is_empty()) {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                ShsError::UnexpectedFormat(format!(
                    "camera setting without a value: {pair:?}"
                ))
            })?;
            settings.insert(key.to_string(), Number::parse(value)?);
        }
        groups.insert(group.to_string(), settings);
    }
    if groups.is_empty() {
        return Err(ShsError::UnexpectedFormat(format!(
            "no camera groups in answer: {answer:?}"
        )));
    }
    Ok(groups)
}

/// Extract the value of a named parameter from a get/set-parameter answer.
///
/// The payload is either a bare value or `NAME=VALUE`; when a name is echoed
/// it must match the requested parameter.
pub fn read_parameter(par: &str, answer: &str) -> Result<String> {
    let field = result_field(answer)?;
    match field.split_once('=') {
        Some((name, value)) if name == par => Ok(value.to_string()),
        Some((name, _)) => Err(ShsError::UnexpectedFormat(format!(
            "answer echoes parameter {name:?}, expected {par:?}"
        ))),
        None => Ok(field),
    }
}

/// Classify a raw parameter value by the parameter's name.
///
/// A few names are always opaque strings, a few are filesystem paths, all
/// others are numeric. An empty value echoes back as an empty string for any
/// parameter.
pub fn classify_parameter(par: &str, value: String) -> Result<ParamValue> {
    if value.is_empty() || STRING_PARAMS.contains(&par) {
        return Ok(ParamValue::Str(value));
    }
    if PATH_PARAMS.contains(&par) {
        return Ok(ParamValue::Path(PathBuf::from(value)));
    }
    Ok(ParamValue::Num(Number::parse(&value)?))
}

/// Decode a statistics block: nine numeric fields in protocol order
/// XMIN XMAX YMIN YMAX MIN MAX MEAN PV RMS.
pub fn read_stats(answer: &str) -> Result<FieldStats> {
    let tokens: Vec<f64> = payload_fields(answer)?
        .iter()
        .flat_map(|field| field.split_whitespace())
        .map(|token| Number::parse(token).map(Number::as_f64))
        .collect::<Result<_>>()?;
    if tokens.len() != STATS_FIELD_COUNT {
        return Err(ShsError::UnexpectedFormat(format!(
            "statistics block has {} fields, expected {STATS_FIELD_COUNT}",
            tokens.len()
        )));
    }
    Ok(FieldStats {
        x_min: tokens[0],
        x_max: tokens[1],
        y_min: tokens[2],
        y_max: tokens[3],
        min: tokens[4],
        max: tokens[5],
        mean: tokens[6],
        pv: tokens[7],
        rms: tokens[8],
    })
}

/// Correlate an evaluation answer with the configured pass/fail indices.
///
/// The answer carries only values, in item order; the indices come from a
/// separate query (opcode 7). A count mismatch is malformed rather than
/// silently truncated.
pub fn process_evaluation(answer: &str, indices: &[i64]) -> Result<Evaluation> {
    let values = read_numbers(answer)?;
    if values.len() != indices.len() {
        return Err(ShsError::UnexpectedFormat(format!(
            "evaluation returned {} values for {} configured pass/fail items",
            values.len(),
            indices.len()
        )));
    }
    Ok(indices.iter().copied().zip(values).collect())
}
