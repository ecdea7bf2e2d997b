mod common;

use std::fs;
use std::path::Path;

use common::{app_log, engine, gzip, settings, BASE};
use tempfile::tempdir;
use ultragrep::{search, IndexBackend, LogCollector, OutputMode, TimeWindow};

/// host-a holds a plain log, host-b a compressed one and an older day.
fn layout(root: &Path) -> String {
    let host_a = root.join("host-a");
    let host_b = root.join("host-b");
    fs::create_dir_all(&host_a).expect("mkdir");
    fs::create_dir_all(&host_b).expect("mkdir");

    fs::write(
        host_a.join("app.log-20231114"),
        app_log(100, 10, 0, "AlphaController"),
    )
    .expect("write");
    let beta = app_log(100, 10, 5, "BetaController");
    fs::write(host_b.join("app.log-20231114.gz"), gzip(beta.as_bytes())).expect("write");
    fs::write(
        host_b.join("app.log-20231101"),
        app_log(10, 10, 0, "OldController"),
    )
    .expect("write");

    root.join("*").join("app.log-*").display().to_string()
}

fn window() -> TimeWindow {
    TimeWindow::new(BASE, BASE + 2_000).expect("window")
}

#[test]
fn perf_search_merges_hosts_in_time_order() {
    let root = tempdir().expect("tempdir");
    let glob = layout(root.path());

    let groups = LogCollector::new(&[glob], None)
        .expect("collector")
        .collect(window())
        .expect("collect");
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].len(), 2);

    let index_dir = tempdir().expect("index dir");
    let settings = settings(index_dir.path(), IndexBackend::Flat, true);
    let engine = engine("app", &settings, window(), &[], &[]);

    let mut out = Vec::new();
    let stats = search(&engine, &groups, OutputMode::Perf, &mut out).expect("search");
    assert_eq!(stats.files, 2);

    let text = String::from_utf8(out).expect("utf8");
    let rows: Vec<(u64, String)> = text
        .lines()
        .map(|line| {
            let fields: Vec<&str> = line.split('\t').collect();
            assert_eq!(fields.len(), 3, "perf row {line:?}");
            (fields[0].parse().expect("time"), fields[1].to_string())
        })
        .collect();

    assert_eq!(rows.len(), 200);
    assert!(rows.windows(2).all(|pair| pair[0].0 <= pair[1].0));
    assert_eq!(rows[0], (BASE, "AlphaController#show".to_string()));
    assert_eq!(rows[1], (BASE + 5, "BetaController#show".to_string()));
    assert!(!text.contains("OldController"));
}

#[test]
fn host_filter_limits_the_search() {
    let root = tempdir().expect("tempdir");
    let glob = layout(root.path());

    let groups = LogCollector::new(&[glob], Some("^host-b$"))
        .expect("collector")
        .collect(window())
        .expect("collect");
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].len(), 1);
    assert_eq!(groups[0][0].host.as_deref(), Some("host-b"));

    let index_dir = tempdir().expect("index dir");
    let settings = settings(index_dir.path(), IndexBackend::Sqlite, true);
    let engine = engine("app", &settings, window(), &[r#""id"=>"42""#], &[]);

    let mut out = Vec::new();
    let stats = search(&engine, &groups, OutputMode::Plain, &mut out).expect("search");
    let text = String::from_utf8(out).expect("utf8");

    assert_eq!(stats.per_file.len(), 1);
    assert_eq!(stats.per_file[0].1.matched, 1);
    assert!(text.contains("app.log-20231114.gz"));
    assert!(text.contains("BetaController#show"));
    assert!(!text.contains("AlphaController"));
    assert!(!text.contains("@@"));
}
