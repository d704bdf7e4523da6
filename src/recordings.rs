use crate::reader::AcquisitionReader;
use crate::types::{
    default_stimulus_type, Device, DiagnosticKind, Diagnostics, ExperimentType, IcephysElectrode,
    IcephysMetadata, IntracellularRecording, NwbError, PatchClampSeries, RecordingOptions,
    SessionMetadata, TraceData,
};
use crate::units::conversion_from_unit;
use crate::ConversionMetadata;
use crate::NwbContainer;

const DEFAULT_DEVICE_NAME: &str = "Device";
const DEFAULT_DESCRIPTION: &str = "no description";

fn device_from_metadata(entry: &crate::types::DeviceMetadata) -> Device {
    Device {
        name: entry.name.clone(),
        description: entry
            .description
            .clone()
            .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
        manufacturer: entry.manufacturer.clone().unwrap_or_default(),
    }
}

/// Adds every device in the metadata to the container (idempotent by name).
///
/// If the container would still end up with no devices, a hard-coded
/// default device is created and a `MissingDevice` diagnostic is recorded.
pub fn add_device_from_metadata(
    container: &mut NwbContainer,
    metadata: &IcephysMetadata,
    diagnostics: &mut Diagnostics,
) {
    for entry in &metadata.devices {
        container.add_device(device_from_metadata(entry));
    }

    if container.devices.is_empty() {
        diagnostics.warn(
            DiagnosticKind::MissingDevice,
            "No device metadata was supplied. Creating a default Device now...",
        );
        container.add_device(Device {
            name: DEFAULT_DEVICE_NAME.to_string(),
            description: DEFAULT_DESCRIPTION.to_string(),
            manufacturer: String::new(),
        });
    }
}

/// Adds icephys electrodes to the container.
///
/// Always leaves the container with at least one electrode. When the caller
/// supplied no electrode metadata and the container has none, one default
/// electrode per physical channel is synthesized, named
/// `icephys_electrode_<channel>` and bound to the first device. An electrode
/// whose requested device does not exist auto-creates that device first.
/// Electrode creation is idempotent by name.
pub fn add_icephys_electrodes<R: AcquisitionReader + ?Sized>(
    reader: &R,
    container: &mut NwbContainer,
    metadata: &IcephysMetadata,
    diagnostics: &mut Diagnostics,
) {
    if container.devices.is_empty() {
        diagnostics.warn(
            DiagnosticKind::MissingDevice,
            "When adding icephys electrodes, no devices were found on the container. \
             Creating a Device now...",
        );
        add_device_from_metadata(container, metadata, diagnostics);
    }
    let default_device_name = container.devices[0].name.clone();

    if container.icephys_electrodes.is_empty() && metadata.electrodes.is_empty() {
        diagnostics.warn(
            DiagnosticKind::MissingElectrodes,
            format!(
                "No electrode metadata was supplied. Creating {} default electrodes, \
                 one per physical channel...",
                reader.channel_count()
            ),
        );
        for channel in 0..reader.channel_count() {
            container.add_electrode(IcephysElectrode {
                name: format!("icephys_electrode_{}", channel),
                description: DEFAULT_DESCRIPTION.to_string(),
                device_name: default_device_name.clone(),
            });
        }
        return;
    }

    for entry in &metadata.electrodes {
        if container.has_electrode(&entry.name) {
            continue;
        }
        let device_name = entry
            .device_name
            .clone()
            .unwrap_or_else(|| default_device_name.clone());
        if !container.has_device(&device_name) {
            diagnostics.warn(
                DiagnosticKind::MissingDeviceLink,
                format!(
                    "Device '{}' not detected in attempted link to icephys electrode. \
                     Automatically generating.",
                    device_name
                ),
            );
            container.add_device(Device {
                name: device_name.clone(),
                description: DEFAULT_DESCRIPTION.to_string(),
                manufacturer: String::new(),
            });
        }
        container.add_electrode(IcephysElectrode {
            name: entry.name.clone(),
            description: entry
                .description
                .clone()
                .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
            device_name,
        });
    }
}

/// Adds icephys recordings (stimulus/response pairs) to the container.
///
/// Builds one intracellular-recording row per (segment, electrode), groups
/// the rows of each segment into one simultaneous recording, and closes one
/// sequential recording over all segments, tagged with the session's
/// stimulus type. Row and group indices continue from the container's
/// current table sizes, so repeated appends never collide.
///
/// Rows are staged and committed only after every segment has been read
/// successfully: a reader failure mid-file leaves the container unchanged.
///
/// A source with no stimulus commands is always saved as an i-zero
/// experiment; a nonzero command count that differs from the segment count
/// is a fatal error raised before any row is created.
pub fn add_icephys_recordings<R: AcquisitionReader + ?Sized>(
    reader: &R,
    container: &mut NwbContainer,
    metadata: &IcephysMetadata,
    options: &RecordingOptions,
    diagnostics: &mut Diagnostics,
) -> Result<(), NwbError> {
    let n_segments = reader.segment_count(0)?;

    let protocol = reader.stimulus_protocol()?;
    if protocol.is_none() {
        diagnostics.warn(
            DiagnosticKind::NoStimulusProtocol,
            format!(
                "No stimulus-protocol section found in {}. Saving experiment as 'izero'...",
                reader.source_name()
            ),
        );
    }
    let n_commands = protocol.as_ref().map_or(0, |p| p.n_commands());

    let mut experiment_type = options.experiment_type;
    if n_commands == 0 {
        diagnostics.warn(
            DiagnosticKind::ExperimentTypeDowngrade,
            format!(
                "No command data found by the reader in {}. Saving experiment as 'izero'...",
                reader.source_name()
            ),
        );
        experiment_type = ExperimentType::IZero;
    } else if n_commands != n_segments {
        return Err(NwbError::SegmentCommandMismatch {
            n_segments,
            n_commands,
        });
    }

    // Auto-create electrodes in case they don't exist yet in the container
    if container.icephys_electrodes.is_empty() {
        diagnostics.warn(
            DiagnosticKind::MissingElectrodes,
            "When adding icephys recordings, no icephys electrodes were found on the \
             container. Creating electrodes now...",
        );
        add_icephys_electrodes(reader, container, metadata, diagnostics);
    }

    let offsets = container.append_offsets();

    let session = match metadata.sessions.get(offsets.sequential_offset) {
        Some(session) => session.clone(),
        None => {
            diagnostics.warn(
                DiagnosticKind::MissingSessionMetadata,
                format!(
                    "No session metadata entry at index {}. Using a relative session \
                     start time of 0.",
                    offsets.sequential_offset
                ),
            );
            SessionMetadata {
                relative_session_start_time: 0.0,
                stimulus_type: default_stimulus_type(),
            }
        }
    };

    let sampling_rate = reader.sampling_rate();
    let electrode_names: Vec<String> = container
        .icephys_electrodes
        .iter()
        .take(reader.channel_units().len())
        .map(|e| e.name.clone())
        .collect();

    // Stage all rows first; the container is only touched once every
    // segment has been read successfully.
    let mut staged_rows: Vec<IntracellularRecording> = Vec::new();
    let mut staged_groups: Vec<Vec<usize>> = Vec::new();

    for segment in 0..n_segments {
        // Starting time is the signal starting time within the source file
        // plus the session's offset relative to the first session.
        let starting_time =
            reader.signal_start_time(0, segment)? + session.relative_session_start_time;

        let mut segment_rows = Vec::new();
        for (channel, electrode_name) in electrode_names.iter().enumerate() {
            if options.skip_electrodes.contains(&channel) {
                continue;
            }

            let response_unit = &reader.channel_units()[channel];
            let response_conversion = conversion_from_unit(response_unit, diagnostics);
            let response_gain = reader.channel_gains()[channel] as f64;

            let response = PatchClampSeries {
                name: format!(
                    "{}-response-{:02}-ch-{}",
                    experiment_type.as_str(),
                    segment + 1 + offsets.simultaneous_offset,
                    channel
                ),
                description: format!("Response to: {}", session.stimulus_type),
                electrode: electrode_name.clone(),
                kind: experiment_type.response_kind(),
                data: TraceData::Lazy {
                    block: 0,
                    segment,
                    channel,
                },
                starting_time,
                rate: sampling_rate,
                conversion: response_conversion * response_gain,
                gain: f64::NAN,
            };

            let stimulus = match (experiment_type.stimulus_kind(), protocol.as_ref()) {
                (Some(kind), Some(protocol)) => {
                    let stim_unit = protocol.units.get(channel).ok_or_else(|| {
                        NwbError::Reader(format!(
                            "stimulus protocol has no command channel {}",
                            channel
                        ))
                    })?;
                    let trace = protocol.traces[segment].get(channel).ok_or_else(|| {
                        NwbError::Reader(format!(
                            "stimulus protocol segment {} has no command channel {}",
                            segment, channel
                        ))
                    })?;
                    let stim_conversion = conversion_from_unit(stim_unit, diagnostics);
                    Some(PatchClampSeries {
                        name: format!(
                            "stimulus-{:02}-ch-{}",
                            segment + 1 + offsets.simultaneous_offset,
                            channel
                        ),
                        description: format!("Stim type: {}", session.stimulus_type),
                        electrode: electrode_name.clone(),
                        kind,
                        data: TraceData::F32(trace.clone()),
                        starting_time,
                        rate: sampling_rate,
                        conversion: stim_conversion,
                        gain: f64::NAN,
                    })
                }
                _ => None,
            };

            segment_rows.push(offsets.row_offset + staged_rows.len());
            staged_rows.push(IntracellularRecording {
                electrode: electrode_name.clone(),
                response,
                stimulus,
            });
        }
        staged_groups.push(segment_rows);
    }

    // Commit: rows, then one simultaneous group per segment, then exactly
    // one sequential group for the whole source file.
    for row in staged_rows {
        container.add_intracellular_recording(row);
    }
    let simultaneous_indices: Vec<usize> = staged_groups
        .into_iter()
        .map(|rows| container.add_simultaneous_recording(rows))
        .collect();
    container.add_sequential_recording(simultaneous_indices, &session.stimulus_type);

    Ok(())
}

/// Adds all recording-related information from one source file to the
/// container: devices, then electrodes, then the recordings themselves.
pub fn add_all<R: AcquisitionReader + ?Sized>(
    reader: &R,
    container: &mut NwbContainer,
    metadata: &ConversionMetadata,
    options: &RecordingOptions,
    diagnostics: &mut Diagnostics,
) -> Result<(), NwbError> {
    add_device_from_metadata(container, &metadata.icephys, diagnostics);
    add_icephys_electrodes(reader, container, &metadata.icephys, diagnostics);
    add_icephys_recordings(reader, container, &metadata.icephys, options, diagnostics)
}
