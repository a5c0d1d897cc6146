use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use contentkit_core::docindex::{IndexOptions, index_documents};
use contentkit_core::error::WarningKind;
use contentkit_core::ingest::{IngestOptions, ingest_sheets};
use contentkit_core::model::{ContentIndex, NewsroomIndex};
use contentkit_core::newsroom::{NewsroomOptions, index_newsroom};
use contentkit_core::runtime::ResolvedPaths;
use contentkit_core::validate::validate_outputs;
use contentkit_core::writer::WriteStatus;
use serde_json::json;
use tempfile::tempdir;

const SHEET: &str = "\
id,slug,type,date,title,description,contentFormat,industry,image,placement,priority,link,section_challenge,section_outcome
cs-1,grid-pilot,Case Study,1-Mar-26,Grid Pilot,How a utility cut peak load,downloadable,Energy,/images/grid,Case Studies,2,,\"Peak demand, every summer\",Down 18%
r-1,storage-outlook,Report,Q1 2026,Storage Outlook,Battery markets in 2026,downloadable,Energy,/images/storage.png,Reports,,/downloads/storage-outlook,,
";

const AUTHORED: &str = "---
title: Heat Pumps at Scale
industry: Buildings
description: Lessons from three retrofits
type: Insight
placement: Insights
contentFormat: non-downloadable
tags:
  - heat
  - retrofit
---

# Heat Pumps at Scale

Body text.
";

const RELEASE: &str = "---
title: We Opened a Lab
industry: Energy
---

# We Opened a Lab

Our new lab in Rotterdam tests grid batteries under real load.
";

fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().expect("parent")).expect("create dir");
    fs::write(path, content).expect("write file");
}

fn seed_project(root: &Path) -> ResolvedPaths {
    let paths = ResolvedPaths::for_project_root(root);
    write(&paths.sheets_dir.join("case-studies.csv"), SHEET);
    write(&paths.media_dir.join("grid.webp"), "webp");
    write(&paths.media_dir.join("grid.png"), "png");
    write(&paths.media_dir.join("storage.png"), "png");
    write(&paths.downloads_dir.join("storage-outlook.pdf"), "pdf");
    write(&paths.markdown_dir.join("insights/heat-pumps.md"), AUTHORED);
    write(&paths.newsroom_dir.join("2026-lab-opening.md"), RELEASE);
    paths
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 17).expect("date")
}

fn run_all(
    paths: &ResolvedPaths,
    today: NaiveDate,
) -> (WriteStatus, WriteStatus, WriteStatus, usize) {
    let ingest = ingest_sheets(paths, &IngestOptions::default()).expect("ingest");
    let index = index_documents(paths, &IndexOptions { today: Some(today) }).expect("index");
    let newsroom = index_newsroom(paths, &NewsroomOptions { today }).expect("newsroom");
    (
        ingest.index_status.expect("ingest wrote"),
        index.index_status.expect("index wrote"),
        newsroom.index_status.expect("newsroom wrote"),
        ingest.documents_written,
    )
}

#[test]
fn full_build_produces_a_valid_index() {
    let temp = tempdir().expect("tempdir");
    let paths = seed_project(temp.path());

    let (_, _, _, documents_written) = run_all(&paths, today());
    assert_eq!(documents_written, 1);

    let index = ContentIndex::load(&paths.index_path).expect("load index");
    let slugs = index
        .reports
        .iter()
        .map(|record| record["slug"].as_str().unwrap_or_default())
        .collect::<Vec<_>>();
    assert_eq!(slugs, vec!["grid-pilot", "storage-outlook", "heat-pumps"]);

    let pilot = &index.reports[0];
    assert_eq!(pilot["date"], json!("2026-03-01"));
    assert_eq!(pilot["image"], json!("/images/grid.webp"));
    assert_eq!(pilot["priority"], json!(2));
    assert_eq!(
        pilot["document"],
        json!({"origin": "generated", "path": "energy/grid-pilot.md"})
    );
    assert!(!pilot.contains_key("sourceRef"));

    let outlook = &index.reports[1];
    assert_eq!(outlook["link"], json!("/downloads/storage-outlook.pdf"));
    assert!(!outlook.contains_key("document"));

    let heat = &index.reports[2];
    assert_eq!(heat["sourceRef"], json!("insights/heat-pumps"));
    assert_eq!(heat["date"], json!("2026-10-17"));

    let generated =
        fs::read_to_string(paths.documents_dir.join("energy/grid-pilot.md")).expect("read doc");
    assert!(generated.contains("## Challenge\n\nPeak demand, every summer\n"));
    assert!(generated.contains("## Outcome\n\nDown 18%\n"));

    let newsroom = NewsroomIndex::load(&paths.newsroom_index_path).expect("load newsroom");
    assert_eq!(newsroom.releases[0].slug, "2026-lab-opening");
    assert_eq!(
        newsroom.releases[0].summary,
        "Our new lab in Rotterdam tests grid batteries under real load."
    );

    let report = validate_outputs(&paths).expect("validate");
    assert!(report.is_success(), "{:?}", report.findings);
}

#[test]
fn second_build_writes_nothing() {
    let temp = tempdir().expect("tempdir");
    let paths = seed_project(temp.path());
    run_all(&paths, today());

    let later = NaiveDate::from_ymd_opt(2026, 12, 1).expect("date");
    let (ingest, index, newsroom, documents_written) = run_all(&paths, later);
    assert_eq!(ingest, WriteStatus::Unchanged);
    assert_eq!(index, WriteStatus::Unchanged);
    assert_eq!(newsroom, WriteStatus::Unchanged);
    assert_eq!(documents_written, 0);
}

#[test]
fn indexer_never_touches_sheet_records() {
    let temp = tempdir().expect("tempdir");
    let paths = seed_project(temp.path());
    ingest_sheets(&paths, &IngestOptions::default()).expect("ingest");

    write(
        &paths.markdown_dir.join("takeover.md"),
        &AUTHORED
            .replace("title: Heat Pumps at Scale", "title: Hijack\nslug: grid-pilot")
            .replace("Insights", "Reports"),
    );
    let report = index_documents(&paths, &IndexOptions { today: Some(today()) }).expect("index");
    assert_eq!(report.failed, 0, "{:?}", report.failures);
    assert!(
        report
            .warnings
            .iter()
            .any(|warning| warning.kind == WarningKind::NonInterferenceSkip
                && warning.location == "takeover.md")
    );

    let index = ContentIndex::load(&paths.index_path).expect("load index");
    let position = index.position_by_slug("grid-pilot").expect("pilot");
    assert_eq!(index.reports[position]["title"], json!("Grid Pilot"));
}

#[test]
fn records_without_a_source_survive_every_stage() {
    let temp = tempdir().expect("tempdir");
    let paths = seed_project(temp.path());
    write(
        &paths.index_path,
        r#"{"_meta":{"generatedBy":"legacy"},"reports":[{"id":"retired","slug":"retired-piece","title":"Old but live","date":"2019-05-01"}]}"#,
    );

    run_all(&paths, today());
    let index = ContentIndex::load(&paths.index_path).expect("load index");
    assert_eq!(index.other["_meta"], json!({"generatedBy": "legacy"}));
    let position = index.position_by_slug("retired-piece").expect("kept");
    assert_eq!(index.reports[position]["title"], json!("Old but live"));
    assert_eq!(position, 0);
}
