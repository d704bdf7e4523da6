mod common;

use common::MockReader;
use nwb_converter::{
    add_all, ConversionMetadata, DiagnosticKind, Diagnostics, ExperimentType, NwbContainer,
    NwbError, RecordingOptions, SeriesKind, TraceData,
};

fn session_metadata(n_sessions: usize) -> ConversionMetadata {
    let sessions: Vec<String> = (0..n_sessions)
        .map(|i| {
            format!(
                r#"{{"relative_session_start_time": {}, "stimulus_type": "ramp {}"}}"#,
                i as f64 * 100.0,
                i
            )
        })
        .collect();
    ConversionMetadata::from_json(&format!(
        r#"{{"Icephys": {{"Sessions": [{}]}}}}"#,
        sessions.join(",")
    ))
    .unwrap()
}

#[test]
fn default_run_creates_one_device_and_one_electrode_per_channel() {
    let reader = MockReader::with_protocol(2, 4);
    let mut container = NwbContainer::new("test", "id-0");
    let mut diagnostics = Diagnostics::new();

    add_all(
        &reader,
        &mut container,
        &session_metadata(1),
        &RecordingOptions::default(),
        &mut diagnostics,
    )
    .unwrap();

    assert_eq!(container.devices.len(), 1);
    assert_eq!(container.icephys_electrodes.len(), 4);
    for (i, electrode) in container.icephys_electrodes.iter().enumerate() {
        assert_eq!(electrode.name, format!("icephys_electrode_{}", i));
        assert_eq!(electrode.device_name, container.devices[0].name);
    }
    assert_eq!(diagnostics.count_of(DiagnosticKind::MissingDevice), 1);
    assert_eq!(diagnostics.count_of(DiagnosticKind::MissingElectrodes), 1);
}

#[test]
fn one_append_builds_rows_groups_and_one_sequential_recording() {
    let reader = MockReader::with_protocol(3, 2);
    let mut container = NwbContainer::new("test", "id-1");
    let mut diagnostics = Diagnostics::new();

    add_all(
        &reader,
        &mut container,
        &session_metadata(1),
        &RecordingOptions::default(),
        &mut diagnostics,
    )
    .unwrap();

    assert_eq!(container.intracellular_recordings.len(), 6);
    assert_eq!(container.simultaneous_recordings.len(), 3);
    assert_eq!(container.sequential_recordings.len(), 1);

    // Each segment groups one row per electrode, in electrode order
    assert_eq!(container.simultaneous_recordings[0].recordings, vec![0, 1]);
    assert_eq!(container.simultaneous_recordings[2].recordings, vec![4, 5]);
    assert_eq!(
        container.sequential_recordings[0].simultaneous_recordings,
        vec![0, 1, 2]
    );
    assert_eq!(container.sequential_recordings[0].stimulus_type, "ramp 0");

    let row = &container.intracellular_recordings[3];
    assert_eq!(row.response.name, "voltage_clamp-response-02-ch-1");
    assert_eq!(row.response.kind, SeriesKind::VoltageClampSeries);
    assert_eq!(row.response.unit(), "amperes");
    // pA unit factor folded with the channel gain of 2.0
    assert_eq!(row.response.conversion, 2.0 * 1e-12);
    assert!(row.response.gain.is_nan());
    assert!(matches!(
        row.response.data,
        TraceData::Lazy {
            block: 0,
            segment: 1,
            channel: 1
        }
    ));

    let stimulus = row.stimulus.as_ref().unwrap();
    assert_eq!(stimulus.name, "stimulus-02-ch-1");
    assert_eq!(stimulus.kind, SeriesKind::VoltageClampStimulusSeries);
    assert_eq!(stimulus.unit(), "volts");
    assert_eq!(stimulus.conversion, 1e-3);
    assert!(stimulus.gain.is_nan());
    assert_eq!(stimulus.starting_time, row.response.starting_time);
    assert_eq!(stimulus.rate, row.response.rate);
}

#[test]
fn appending_two_sources_never_reuses_row_indices() {
    let first = MockReader::with_protocol(2, 2);
    let second = MockReader::with_protocol(3, 2);
    let metadata = session_metadata(2);
    let mut container = NwbContainer::new("test", "id-2");
    let mut diagnostics = Diagnostics::new();
    let options = RecordingOptions::default();

    add_all(&first, &mut container, &metadata, &options, &mut diagnostics).unwrap();
    add_all(&second, &mut container, &metadata, &options, &mut diagnostics).unwrap();

    assert_eq!(container.intracellular_recordings.len(), 10);
    assert_eq!(container.simultaneous_recordings.len(), 5);
    assert_eq!(container.sequential_recordings.len(), 2);

    // Row indices are globally unique and strictly increasing across appends
    let mut seen: Vec<usize> = container
        .simultaneous_recordings
        .iter()
        .flat_map(|g| g.recordings.iter().copied())
        .collect();
    assert!(seen.windows(2).all(|w| w[1] > w[0]));
    seen.dedup();
    assert_eq!(seen.len(), 10);

    // The second sequential recording only references groups from its own append
    assert_eq!(
        container.sequential_recordings[1].simultaneous_recordings,
        vec![2, 3, 4]
    );
    assert_eq!(container.sequential_recordings[1].stimulus_type, "ramp 1");

    // Second-session rows carry the session start offset and continued numbering
    let row = &container.intracellular_recordings[4];
    assert_eq!(row.response.name, "voltage_clamp-response-03-ch-0");
    assert_eq!(row.response.starting_time, 100.0);
}

#[test]
fn zero_commands_forces_izero_and_creates_no_stimulus_records() {
    let reader = MockReader::with_empty_protocol(2, 2);
    let mut container = NwbContainer::new("test", "id-3");
    let mut diagnostics = Diagnostics::new();
    let options = RecordingOptions {
        experiment_type: ExperimentType::CurrentClamp,
        ..Default::default()
    };

    add_all(
        &reader,
        &mut container,
        &session_metadata(1),
        &options,
        &mut diagnostics,
    )
    .unwrap();

    assert_eq!(
        diagnostics.count_of(DiagnosticKind::ExperimentTypeDowngrade),
        1
    );
    for row in &container.intracellular_recordings {
        assert!(row.stimulus.is_none());
        assert_eq!(row.response.kind, SeriesKind::IZeroClampSeries);
        assert!(row.response.name.starts_with("izero-response-"));
    }
}

#[test]
fn missing_protocol_section_downgrades_with_two_diagnostics() {
    let reader = MockReader::without_protocol_section(2, 1);
    let mut container = NwbContainer::new("test", "id-4");
    let mut diagnostics = Diagnostics::new();

    add_all(
        &reader,
        &mut container,
        &session_metadata(1),
        &RecordingOptions::default(),
        &mut diagnostics,
    )
    .unwrap();

    assert_eq!(diagnostics.count_of(DiagnosticKind::NoStimulusProtocol), 1);
    assert_eq!(
        diagnostics.count_of(DiagnosticKind::ExperimentTypeDowngrade),
        1
    );
    assert!(container.intracellular_recordings[0].stimulus.is_none());
}

#[test]
fn command_segment_mismatch_fails_before_any_row_is_created() {
    let reader = MockReader::with_mismatched_protocol(2, 2);
    let mut container = NwbContainer::new("test", "id-5");
    let mut diagnostics = Diagnostics::new();

    let result = add_all(
        &reader,
        &mut container,
        &session_metadata(1),
        &RecordingOptions::default(),
        &mut diagnostics,
    );

    match result {
        Err(NwbError::SegmentCommandMismatch {
            n_segments,
            n_commands,
        }) => {
            assert_eq!(n_segments, 2);
            assert_eq!(n_commands, 3);
        }
        other => panic!("expected SegmentCommandMismatch, got {:?}", other.err()),
    }
    assert!(container.intracellular_recordings.is_empty());
    assert!(container.simultaneous_recordings.is_empty());
    assert!(container.sequential_recordings.is_empty());
}

#[test]
fn reader_failure_mid_segment_leaves_the_container_unchanged() {
    // Protocol claims as many commands as segments, but has no trace for
    // the second channel, so assembly fails inside the electrode loop.
    let mut reader = MockReader::with_protocol(2, 2);
    if let Some(protocol) = reader.protocol.as_mut() {
        for segment in protocol.traces.iter_mut() {
            segment.truncate(1);
        }
    }
    let mut container = NwbContainer::new("test", "id-6");
    let mut diagnostics = Diagnostics::new();

    let result = add_all(
        &reader,
        &mut container,
        &session_metadata(1),
        &RecordingOptions::default(),
        &mut diagnostics,
    );

    assert!(matches!(result, Err(NwbError::Reader(_))));
    assert!(container.intracellular_recordings.is_empty());
    assert!(container.simultaneous_recordings.is_empty());
    assert!(container.sequential_recordings.is_empty());
}

#[test]
fn skip_electrodes_removes_those_channels_from_every_segment() {
    let reader = MockReader::with_protocol(2, 3);
    let mut container = NwbContainer::new("test", "id-7");
    let mut diagnostics = Diagnostics::new();
    let options = RecordingOptions {
        skip_electrodes: vec![0, 2],
        ..Default::default()
    };

    add_all(
        &reader,
        &mut container,
        &session_metadata(1),
        &options,
        &mut diagnostics,
    )
    .unwrap();

    assert_eq!(container.intracellular_recordings.len(), 2);
    for row in &container.intracellular_recordings {
        assert_eq!(row.electrode, "icephys_electrode_1");
    }
    for group in &container.simultaneous_recordings {
        assert_eq!(group.recordings.len(), 1);
    }
}

#[test]
fn electrode_metadata_with_unknown_device_auto_creates_the_device() {
    let reader = MockReader::with_protocol(1, 2);
    let metadata = ConversionMetadata::from_json(
        r#"{
            "Icephys": {
                "Device": [{"name": "Axopatch 200B", "description": "amplifier"}],
                "Electrodes": [
                    {"name": "cell-1", "device_name": "Axopatch 200B"},
                    {"name": "cell-2", "device_name": "MultiClamp 700B"}
                ],
                "Sessions": [{"relative_session_start_time": 0.0, "stimulus_type": "step"}]
            }
        }"#,
    )
    .unwrap();
    let mut container = NwbContainer::new("test", "id-8");
    let mut diagnostics = Diagnostics::new();

    add_all(
        &reader,
        &mut container,
        &metadata,
        &RecordingOptions::default(),
        &mut diagnostics,
    )
    .unwrap();

    assert_eq!(diagnostics.count_of(DiagnosticKind::MissingDeviceLink), 1);
    assert!(container.has_device("MultiClamp 700B"));
    assert_eq!(container.electrode("cell-2").unwrap().device_name, "MultiClamp 700B");
    // Every electrode references an existing device
    for electrode in &container.icephys_electrodes {
        assert!(container.has_device(&electrode.device_name));
    }
}

#[test]
fn electrode_creation_is_idempotent_by_name() {
    let reader = MockReader::with_protocol(1, 1);
    let metadata = ConversionMetadata::from_json(
        r#"{
            "Icephys": {
                "Device": [{"name": "rig"}],
                "Electrodes": [{"name": "cell-1", "description": "whole-cell"}],
                "Sessions": [{"relative_session_start_time": 0.0, "stimulus_type": "step"}]
            }
        }"#,
    )
    .unwrap();
    let mut container = NwbContainer::new("test", "id-9");
    let mut diagnostics = Diagnostics::new();
    let options = RecordingOptions::default();

    add_all(&reader, &mut container, &metadata, &options, &mut diagnostics).unwrap();
    // Re-requesting the same electrode name is a no-op
    nwb_converter::add_icephys_electrodes(&reader, &mut container, &metadata.icephys, &mut diagnostics);

    assert_eq!(container.icephys_electrodes.len(), 1);
    assert_eq!(
        container.electrode("cell-1").unwrap().description,
        "whole-cell"
    );
}

#[test]
fn missing_session_metadata_falls_back_to_defaults() {
    let reader = MockReader::with_protocol(1, 1);
    let mut container = NwbContainer::new("test", "id-10");
    let mut diagnostics = Diagnostics::new();

    add_all(
        &reader,
        &mut container,
        &ConversionMetadata::default(),
        &RecordingOptions::default(),
        &mut diagnostics,
    )
    .unwrap();

    assert_eq!(
        diagnostics.count_of(DiagnosticKind::MissingSessionMetadata),
        1
    );
    assert_eq!(
        container.sequential_recordings[0].stimulus_type,
        "not described"
    );
    assert_eq!(
        container.intracellular_recordings[0].response.starting_time,
        0.0
    );
}

#[test]
fn malformed_electrode_metadata_is_rejected_when_parsed() {
    let result = ConversionMetadata::from_json(
        r#"{"Icephys": {"Electrodes": ["not a mapping"]}}"#,
    );
    assert!(matches!(result, Err(NwbError::MetadataError(_))));
}

#[test]
fn experiment_type_names_round_trip() {
    assert_eq!(
        "voltage_clamp".parse::<ExperimentType>().unwrap(),
        ExperimentType::VoltageClamp
    );
    assert_eq!(
        "izero".parse::<ExperimentType>().unwrap(),
        ExperimentType::IZero
    );
    assert!(matches!(
        "patch".parse::<ExperimentType>(),
        Err(NwbError::InvalidExperimentType(_))
    ));
}
