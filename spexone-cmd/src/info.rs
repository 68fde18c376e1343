use std::collections::BTreeMap;
use std::fs::File;
use std::io::{stdout, BufReader, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::SecondsFormat;
use handlebars::handlebars_helper;
use serde::Serialize;
use spexone::spacepacket::{GroupStats, Summary};
use spexone::{collect_groups, decode_packets, Apid, Timestamp};
use tracing::warn;

#[derive(Debug, Clone)]
pub enum Format {
    Json,
    Text,
}

impl clap::ValueEnum for Format {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Json, Self::Text]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        match self {
            Self::Json => Some(clap::builder::PossibleValue::new("json")),
            Self::Text => Some(clap::builder::PossibleValue::new("text")),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct ApidInfo {
    total_packets: usize,
    total_bytes: usize,
    missing_packets: usize,
    first_packet_time: Option<String>,
    last_packet_time: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct Info {
    filename: String,
    summary: ApidInfo,
    logical_packets: usize,
    dropped: GroupStats,
    /// Error that ended decoding, if the file is truncated
    error: Option<String>,
    apids: BTreeMap<Apid, ApidInfo>,
}

fn utc(ts: Option<Timestamp>, leap_seconds: i64) -> Option<String> {
    ts.map(|ts| {
        ts.to_utc(leap_seconds)
            .to_rfc3339_opts(SecondsFormat::Micros, true)
    })
}

fn summarize(fpath: &Path, leap_seconds: i64) -> Result<Info> {
    let reader = File::open(fpath).context("opening input")?;

    let mut summary = Summary::default();
    let mut packets = Vec::default();
    let mut error = None;
    for zult in decode_packets(BufReader::new(reader)) {
        match zult {
            Ok(packet) => {
                summary.add(&packet);
                packets.push(packet);
            }
            Err(err) => {
                warn!("{err}");
                error = Some(err.to_string());
            }
        }
    }

    let mut grouper = collect_groups(packets);
    let logical_packets = grouper.by_ref().count();

    Ok(Info {
        filename: fpath.to_string_lossy().to_string(),
        summary: ApidInfo {
            total_packets: summary.count,
            total_bytes: summary.bytes,
            missing_packets: summary.missing,
            first_packet_time: utc(summary.first, leap_seconds),
            last_packet_time: utc(summary.last, leap_seconds),
        },
        logical_packets,
        dropped: grouper.stats(),
        error,
        apids: summary
            .apids
            .iter()
            .map(|(apid, s)| {
                (
                    *apid,
                    ApidInfo {
                        total_packets: s.count,
                        total_bytes: s.bytes,
                        missing_packets: s.missing,
                        first_packet_time: utc(s.first, leap_seconds),
                        last_packet_time: utc(s.last, leap_seconds),
                    },
                )
            })
            .collect(),
    })
}

pub fn info(fpath: &Path, format: &Format, leap_seconds: i64) -> Result<()> {
    let info = summarize(fpath, leap_seconds)?;

    match format {
        Format::Json => {
            serde_json::to_writer_pretty(stdout(), &info).context("serializing to json")
        }
        Format::Text => {
            let data = render_text(&info).context("serializing info")?;
            stdout()
                .write_all(str::as_bytes(&data))
                .context("writing to stdout")
        }
    }
}

fn render_text(info: &Info) -> Result<String> {
    handlebars_helper!(left_pad: |num: u64, v: Json| {
        let v = match v {
            serde_json::Value::String(s) => s.to_owned(),
            serde_json::Value::Null => String::new(),
            _ => v.to_string()
        };
        let num = usize::try_from(num).unwrap_or_default().max(v.len());
        format!("{v:>num$}")
    });
    let mut hb = handlebars::Handlebars::new();
    hb.register_helper("lpad", Box::new(left_pad));
    hb.register_template_string("info", TEXT_TEMPLATE)
        .context("registering template")?;

    hb.render("info", &info).context("rendering text")
}

const TEXT_TEMPLATE: &str = r"{{ filename }}
===============================================================================================
First:    {{ summary.first_packet_time }}
Last:     {{ summary.last_packet_time }}
APIDS:    {{ #each apids }}{{ @key }}{{ #if @last }}{{ else }}, {{ /if }}{{ /each }}
Count:    {{ summary.total_packets }}
Bytes:    {{ summary.total_bytes }}
Missing:  {{ summary.missing_packets }}
Logical:  {{ logical_packets }} (orphans: {{ dropped.orphans }}, abandoned: {{ dropped.abandoned }}, broken: {{ dropped.broken }})
{{ #if error }}Error:    {{ error }}
{{ /if }}-----------------------------------------------------------------------------------------------
APID    First                          Last                                 Count   Missing
-----------------------------------------------------------------------------------------------
{{ #each apids }}{{ lpad 6 @key }}  {{ lpad 27 first_packet_time }}  {{ lpad 27 last_packet_time }}   {{ lpad 10 total_packets }}   {{ lpad 7 missing_packets }}
{{/each }}
";
