mod common;

use spexone::l1a::{assemble_l1a, AssemblyOptions};
use spexone::product::{Product, State};
use spexone::telemetry::{NomHkRecord, TmtcIssue, APID_DEMHK, APID_NOMHK, APID_SCIENCE};
use spexone::{collect_groups, read_packet_file, Error, SequenceFlag};

use common::{
    encode_packet, encode_segmented, science_payload, tai, utc, write_file,
};

const SAMPLES: usize = 4;

fn image(n: u16) -> Vec<u16> {
    (0..SAMPLES as u16).map(|i| n * 100 + i).collect()
}

/// Three files with five science images at 1.5 s intervals, some segmented.
fn five_image_files(dir: &std::path::Path) -> Vec<std::path::PathBuf> {
    let issue = TmtcIssue::default();
    let t0 = utc(2023, 3, 1, 10, 0, 0, 125);
    let packet = |n: u16, seqid: u16, parts: usize| {
        let ts = tai(t0 + chrono::TimeDelta::milliseconds(1500 * i64::from(n)));
        encode_segmented(
            APID_SCIENCE,
            seqid,
            ts,
            &science_payload(issue, ts, &image(n)),
            parts,
        )
    };

    let mut file1 = packet(0, 10, 3);
    file1.extend(packet(1, 13, 1));
    let file2 = packet(2, 14, 2);
    let mut file3 = packet(3, 16, 1);
    file3.extend(packet(4, 17, 4));

    vec![
        write_file(dir, "SPX000001.spx", &file1),
        write_file(dir, "SPX000002.spx", &file2),
        write_file(dir, "SPX000003.spx", &file3),
    ]
}

#[test]
fn end_to_end_coverage() {
    let dir = tempfile::tempdir().unwrap();
    let files = five_image_files(dir.path());
    let opts = AssemblyOptions::builder().output(dir.path()).build();

    let summary = assemble_l1a(&files, &opts).unwrap().unwrap();

    assert_eq!(summary.images, 5);
    assert_eq!(summary.hk_packets, 0);
    assert_eq!(summary.dropped.dropped(), 0);
    assert!(summary.inflight);
    assert_eq!(
        summary.path,
        dir.path().join("PACE_SPEXONE.20230301T100000.L1A.json")
    );

    let l1a = Product::open(&summary.path).unwrap();
    let attr = |name: &str| l1a.get_attr(name, None).unwrap().unwrap().to_string();
    assert_eq!(attr("time_coverage_start"), "2023-03-01T10:00:00.125+00:00");
    assert_eq!(attr("time_coverage_end"), "2023-03-01T10:00:06.125+00:00");
    assert_eq!(attr("platform"), "PACE");
    assert_eq!(attr("product_name"), "PACE_SPEXONE.20230301T100000.L1A.json");
    assert_eq!(
        attr("input_files"),
        "SPX000001.spx, SPX000002.spx, SPX000003.spx"
    );

    assert_eq!(l1a.dimension_len("number_of_images").unwrap(), 5);
    assert_eq!(l1a.dimension_len("samples_per_image").unwrap(), SAMPLES);

    let images = l1a.get_variable("/science_data/detector_images").unwrap();
    let images = images.as_u16().unwrap();
    assert_eq!(images.shape(), &[5, SAMPLES]);
    assert_eq!(images[[4, 3]], 403);

    let ids = l1a.get_variable("/image_attributes/image_ID").unwrap();
    let ids: Vec<u16> = ids.as_u16().unwrap().iter().copied().collect();
    assert_eq!(ids, vec![10, 13, 14, 16, 17]);

    let times = l1a.get_variable("/image_attributes/image_time").unwrap();
    let times: Vec<f64> = times.as_f64().unwrap().iter().copied().collect();
    assert_eq!(times, vec![36000.125, 36001.625, 36003.125, 36004.625, 36006.125]);

    let coadds = l1a.get_variable("/image_attributes/nr_coadditions").unwrap();
    assert!(coadds.as_u16().unwrap().iter().all(|&n| n == 4));
    let tables = l1a.get_variable("/image_attributes/binning_table").unwrap();
    assert!(tables.as_i32().unwrap().iter().all(|&t| t == -1));
    assert_eq!(l1a.stored("/image_attributes/icu_time_sec").unwrap(), 5);
    assert!(l1a.check_stored().is_empty());
}

#[test]
fn existing_product_is_not_replaced_without_clobber() {
    let dir = tempfile::tempdir().unwrap();
    let files = five_image_files(dir.path());
    let opts = AssemblyOptions::builder().output(dir.path()).build();
    assemble_l1a(&files, &opts).unwrap();

    let zult = assemble_l1a(&files, &opts);
    assert!(matches!(zult, Err(Error::Io(_))), "{zult:?}");

    let opts = AssemblyOptions::builder()
        .output(dir.path())
        .clobber(true)
        .build();
    assert!(assemble_l1a(&files, &opts).unwrap().is_some());
}

#[test]
fn on_ground_measurement_skips_header_files() {
    let dir = tempfile::tempdir().unwrap();
    let issue = TmtcIssue(11);
    let ts = tai(utc(2021, 6, 15, 8, 0, 0, 0));
    let dat = encode_segmented(
        APID_SCIENCE,
        0,
        ts,
        &science_payload(issue, ts, &image(1)),
        2,
    );
    let files = vec![
        write_file(dir.path(), "DARK_001.H", b"not a packet file"),
        write_file(dir.path(), "DARK_001.0", &dat),
    ];
    let opts = AssemblyOptions::builder()
        .tmtc_issue(issue)
        .output(dir.path())
        .msm_id("DARK_001")
        .build();

    let summary = assemble_l1a(&files, &opts).unwrap().unwrap();

    assert!(!summary.inflight);
    assert_eq!(
        summary.path.file_name().unwrap(),
        "SPX1_OCAL_DARK_001_L1A_20210615T080000.json"
    );
    let l1a = Product::open(&summary.path).unwrap();
    assert_eq!(
        l1a.get_attr("input_files", None).unwrap().unwrap().to_string(),
        "DARK_001.0"
    );
    assert_eq!(
        l1a.get_attr("platform", None).unwrap().unwrap().to_string(),
        "PACE (on-ground)"
    );
    // no ICU time before TMTC issue 12
    assert_eq!(l1a.stored("/image_attributes/icu_time_sec").unwrap(), 0);
    assert_eq!(l1a.stored("/image_attributes/image_time").unwrap(), 1);
}

#[test]
fn housekeeping_temperatures() {
    let dir = tempfile::tempdir().unwrap();
    let t0 = utc(2023, 3, 1, 10, 0, 0, 0);
    let mut dat = Vec::default();
    for (n, raw) in [3_000_000u32, 0].into_iter().enumerate() {
        let record = NomHkRecord {
            ts1_dem_n_t: raw,
            ts2_housing_n_t: 2_500_000,
            ..NomHkRecord::default()
        };
        let ts = tai(t0 + chrono::TimeDelta::seconds(n as i64));
        dat.extend(encode_packet(
            APID_NOMHK,
            SequenceFlag::Standalone,
            n as u16,
            ts,
            &record.to_bytes(),
        ));
    }
    let ts = tai(t0);
    dat.extend(encode_segmented(
        APID_SCIENCE,
        100,
        ts,
        &science_payload(TmtcIssue::default(), ts, &image(0)),
        1,
    ));
    // DemHK is not written
    dat.extend(encode_packet(APID_DEMHK, SequenceFlag::Standalone, 1, ts, &[0; 8]));
    let files = vec![write_file(dir.path(), "hk.spx", &dat)];
    let opts = AssemblyOptions::builder().output(dir.path()).build();

    let summary = assemble_l1a(&files, &opts).unwrap().unwrap();

    assert_eq!(summary.hk_packets, 2);
    assert_eq!(summary.skipped, 1);
    let l1a = Product::open(&summary.path).unwrap();
    let temps = l1a.get_variable("/engineering_data/temp_detector").unwrap();
    let temps: Vec<f32> = temps.as_f32().unwrap().iter().copied().collect();
    assert!((temps[0] - 309.894_28).abs() < 1e-3, "{temps:?}");
    assert_eq!(temps[1], 273.0);
    let housing = l1a.get_variable("/engineering_data/temp_housing").unwrap();
    assert!(housing
        .as_f32()
        .unwrap()
        .iter()
        .all(|t| (t - 317.684_03).abs() < 1e-3));
    let radiator = l1a.get_variable("/engineering_data/temp_radiator").unwrap();
    assert!(radiator.as_f32().unwrap().iter().all(|&t| t == 294.0));
    let hk_time = l1a.get_variable("/engineering_data/HK_tlm_time").unwrap();
    let hk_time: Vec<f64> = hk_time.as_f64().unwrap().iter().copied().collect();
    assert_eq!(hk_time, vec![36000.0, 36001.0]);
    assert_eq!(l1a.dimension_len("hk_packets").unwrap(), 2);
}

#[test]
fn orphans_are_dropped_and_counted() {
    let dir = tempfile::tempdir().unwrap();
    let ts = tai(utc(2023, 3, 1, 10, 0, 0, 0));
    let payload = science_payload(TmtcIssue::default(), ts, &image(0));
    let mut dat = encode_packet(APID_SCIENCE, SequenceFlag::Continuation, 4, ts, &[1, 2]);
    dat.extend(encode_segmented(APID_SCIENCE, 5, ts, &payload, 2));
    let files = vec![write_file(dir.path(), "orphan.spx", &dat)];
    let opts = AssemblyOptions::builder().output(dir.path()).build();

    let summary = assemble_l1a(&files, &opts).unwrap().unwrap();

    assert_eq!(summary.images, 1);
    assert_eq!(summary.dropped.orphans, 1);
}

#[test]
fn truncated_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let ts = tai(utc(2023, 3, 1, 10, 0, 0, 0));
    let mut dat = encode_segmented(
        APID_SCIENCE,
        0,
        ts,
        &science_payload(TmtcIssue::default(), ts, &image(0)),
        1,
    );
    dat.truncate(dat.len() - 3);
    let path = write_file(dir.path(), "short.spx", &dat);

    let zult = assemble_l1a(&[path], &AssemblyOptions::default());

    assert!(matches!(zult, Err(Error::TruncatedPacket { offset: 0, .. })), "{zult:?}");
}

#[test]
fn changing_image_size_fails() {
    let dir = tempfile::tempdir().unwrap();
    let ts = tai(utc(2023, 3, 1, 10, 0, 0, 0));
    let issue = TmtcIssue::default();
    let mut dat = encode_segmented(APID_SCIENCE, 0, ts, &science_payload(issue, ts, &image(0)), 1);
    dat.extend(encode_segmented(
        APID_SCIENCE,
        1,
        ts,
        &science_payload(issue, ts, &[1, 2]),
        1,
    ));
    let files = vec![write_file(dir.path(), "sizes.spx", &dat)];
    let opts = AssemblyOptions::builder().output(dir.path()).build();

    let zult = assemble_l1a(&files, &opts);

    assert!(
        matches!(zult, Err(Error::ImageSize { expected: 4, actual: 2 })),
        "{zult:?}"
    );
}

#[test]
fn no_packets() {
    let dir = tempfile::tempdir().unwrap();
    let files = vec![write_file(dir.path(), "empty.spx", &[])];

    let zult = assemble_l1a(&files, &AssemblyOptions::default()).unwrap();

    assert!(zult.is_none());
}

#[test]
fn read_and_group_file() {
    let dir = tempfile::tempdir().unwrap();
    let files = five_image_files(dir.path());

    let packets = read_packet_file(&files[0]).unwrap();
    assert_eq!(packets.len(), 4);

    let logical: Vec<_> = collect_groups(packets).collect();
    assert_eq!(logical.len(), 2);
    assert_eq!(logical[0].packet_count, 3);
    assert_eq!(logical[0].sequence_count, 10);
    assert_eq!(logical[1].packet_count, 1);
}

#[test]
fn product_is_closed_when_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dropped.json");
    {
        let mut l1a = Product::create(
            &path,
            spexone::Level::L1A,
            utc(2023, 3, 1, 0, 0, 0, 0),
            &[("samples_per_image", spexone::product::DimSize::Fixed(2))],
        )
        .unwrap();
        l1a.write_variable("/image_attributes/image_time", vec![1.0f64, 2.0], None)
            .unwrap();
        assert_eq!(l1a.state(), State::Open);
    }

    let l1a = Product::open(&path).unwrap();
    assert_eq!(l1a.state(), State::ReadOnly);
    assert_eq!(
        l1a.get_attr("time_coverage_end", None).unwrap().unwrap().to_string(),
        "2023-03-01T00:00:02.000+00:00"
    );
}
