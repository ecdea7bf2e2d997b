#![allow(dead_code)]

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use ultragrep::ultragrep_core::time::format_time;
use ultragrep::{
    FormatSpec, IndexBackend, IndexSettings, OutputMode, QueryEngine, QueryStats,
    RequestFilter, RequestPrinter, SearchConfig, TimeWindow,
};

/// 2023-11-14 22:13:20 UTC
pub const BASE: u64 = 1_700_000_000;

/// Rails style log, one request every `step` seconds from `BASE + shift`.
/// Tokens are pseudo-random so gzip output spans many deflate blocks.
pub fn app_log(requests: u64, step: u64, shift: u64, controller: &str) -> String {
    let mut out = String::new();
    let mut seed: u64 = 0x9e37_79b9_7f4a_7c15 ^ shift;
    for i in 0..requests {
        seed = seed
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        out.push_str(&format!(
            "Started GET \"/orders/{i}\" for 10.0.0.{} at {} +0000\n",
            i % 250,
            format_time(BASE + shift + i * step)
        ));
        out.push_str(&format!("Processing by {controller}#show as HTML\n"));
        out.push_str(&format!(
            "  Parameters: {{\"id\"=>\"{i}\", \"token\"=>\"{seed:016x}{:016x}\"}}\n",
            seed.rotate_left(23)
        ));
        out.push_str(&format!("Completed 200 OK in {}ms\n\n\n", seed % 500 + 1));
    }
    out
}

/// Single-member gzip file with a zero CRC.
pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut out = vec![0x1f, 0x8b, 0x08, 0x00, 0, 0, 0, 0, 0x00, 0xff];
    out.extend(miniz_oxide::deflate::compress_to_vec(data, 6));
    out.extend_from_slice(&[0, 0, 0, 0]);
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out
}

pub fn bzip2(data: &[u8]) -> Vec<u8> {
    let mut encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::fast());
    encoder.write_all(data).expect("compress");
    encoder.finish().expect("finish")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    Plain,
    Gzip,
    Bzip2,
}

/// Writes `data` as `<name>`, `<name>.gz` or `<name>.bz2`.
pub fn write_log(dir: &Path, name: &str, data: &[u8], input: Input) -> PathBuf {
    let (path, bytes) = match input {
        Input::Plain => (dir.join(name), data.to_vec()),
        Input::Gzip => (dir.join(format!("{name}.gz")), gzip(data)),
        Input::Bzip2 => (dir.join(format!("{name}.bz2")), bzip2(data)),
    };
    fs::write(&path, bytes).expect("write log");
    path
}

pub fn settings(index_dir: &Path, backend: IndexBackend, auto_build: bool) -> IndexSettings {
    IndexSettings {
        dir: Some(index_dir.to_path_buf()),
        backend,
        granularity_secs: 10,
        gzip_span_bytes: 32 * 1024,
        auto_build,
    }
}

pub fn engine(
    format: &str,
    settings: &IndexSettings,
    window: TimeWindow,
    patterns: &[&str],
    keys: &[&str],
) -> QueryEngine {
    let format = FormatSpec::resolve(format, &SearchConfig::default()).expect("format");
    let filter = RequestFilter::compile(window, patterns, keys).expect("filter");
    QueryEngine::new(format, settings, filter)
}

pub fn query(engine: &QueryEngine, log: &Path, mode: OutputMode) -> (String, QueryStats) {
    let mut printer = RequestPrinter::new(Vec::new(), mode).expect("printer");
    let stats = engine.run(log, &mut printer).expect("query");
    let text = String::from_utf8(printer.into_inner()).expect("utf8");
    (text, stats)
}

/// Query output without the `@@` progress markers.
pub fn bodies(output: &str) -> String {
    output
        .split_inclusive('\n')
        .filter(|line| !line.starts_with("@@"))
        .collect()
}

pub fn markers(output: &str) -> Vec<u64> {
    output
        .lines()
        .filter_map(|line| line.strip_prefix("@@"))
        .map(|time| time.parse().expect("marker time"))
        .collect()
}
