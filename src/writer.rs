use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use ndarray::Array1;
use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::reader::AcquisitionReader;
use crate::recordings::add_all;
use crate::types::*;

// Constants used throughout the container snapshot format
const NWB_MAGIC_NUMBER: u32 = 0x4e574243;
const FORMAT_VERSION_MAJOR: u16 = 1;
const FORMAT_VERSION_MINOR: u16 = 0;

// Trace payload dtype tags
const DTYPE_I32: u8 = 0;
const DTYPE_F32: u8 = 1;

/// Primary function for writing an acquisition reader to a container file.
///
/// If `save_path` already holds a container snapshot and `overwrite` is
/// false, the existing container is read back and the new recordings are
/// appended to it; otherwise a fresh container is created. Response data is
/// fetched from the reader only here, at write time, and the compression
/// policy from `options` is applied to every trace payload.
///
/// The file handle is scoped to this call and released on every exit path.
/// Nothing is written until the whole source file has been assembled, so a
/// fatal error leaves an existing snapshot untouched.
///
/// Returns the diagnostics that accumulated during assembly.
pub fn write_reader_to_nwb<R: AcquisitionReader + ?Sized, P: AsRef<Path>>(
    reader: &R,
    save_path: P,
    overwrite: bool,
    metadata: Option<&ConversionMetadata>,
    options: &RecordingOptions,
) -> Result<Diagnostics, NwbError> {
    // Start timing
    let tic = Instant::now();

    let generated_metadata;
    let metadata = match metadata {
        Some(metadata) => metadata,
        None => {
            generated_metadata = default_conversion_metadata(reader);
            &generated_metadata
        }
    };

    let save_path = save_path.as_ref();
    let mut container = if save_path.is_file() && !overwrite {
        read_container_file(save_path)?
    } else {
        new_container(reader, metadata)
    };

    let mut diagnostics = Diagnostics::new();
    add_all(reader, &mut container, metadata, options, &mut diagnostics)?;
    materialize_traces(reader, &mut container)?;

    write_container_file(save_path, &container, options.compression)?;

    // Report how long the conversion took
    println!(
        "Done! Elapsed time: {:.1} seconds",
        tic.elapsed().as_secs_f64()
    );

    Ok(diagnostics)
}

/// Returns auto-generated conversion metadata for a reader.
///
/// Used when the caller supplies no metadata: the session description notes
/// the auto-generation and the identifier is derived from the source name
/// and the current time.
pub fn default_conversion_metadata<R: AcquisitionReader + ?Sized>(
    reader: &R,
) -> ConversionMetadata {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    ConversionMetadata {
        nwb_file: NwbFileMetadata {
            session_description: Some(
                "Auto-generated by nwb_converter without description.".to_string(),
            ),
            identifier: Some(format!("{}-{}", reader.source_name(), nanos)),
        },
        ..Default::default()
    }
}

/// Creates an empty container from the caller metadata, filling in the
/// auto-generated defaults for any missing field.
pub fn new_container<R: AcquisitionReader + ?Sized>(
    reader: &R,
    metadata: &ConversionMetadata,
) -> NwbContainer {
    let defaults = default_conversion_metadata(reader);
    let session_description = metadata
        .nwb_file
        .session_description
        .clone()
        .or(defaults.nwb_file.session_description)
        .unwrap_or_default();
    let identifier = metadata
        .nwb_file
        .identifier
        .clone()
        .or(defaults.nwb_file.identifier)
        .unwrap_or_default();
    NwbContainer::new(&session_description, &identifier)
}

/// Replaces every lazy trace in the container with raw samples fetched from
/// the reader.
pub fn materialize_traces<R: AcquisitionReader + ?Sized>(
    reader: &R,
    container: &mut NwbContainer,
) -> Result<(), NwbError> {
    for row in &mut container.intracellular_recordings {
        materialize_series(reader, &mut row.response)?;
        if let Some(stimulus) = &mut row.stimulus {
            materialize_series(reader, stimulus)?;
        }
    }
    Ok(())
}

fn materialize_series<R: AcquisitionReader + ?Sized>(
    reader: &R,
    series: &mut PatchClampSeries,
) -> Result<(), NwbError> {
    if let TraceData::Lazy {
        block,
        segment,
        channel,
    } = series.data
    {
        series.data = TraceData::RawI32(reader.analog_signal_chunk(block, segment, channel)?);
    }
    Ok(())
}

/// Reads a container snapshot from a file.
///
/// # Examples
///
/// ```no_run
/// use nwb_converter::read_container_file;
///
/// let container = read_container_file("path/to/session.nwb").unwrap();
/// println!("{} intracellular recordings", container.intracellular_recordings.len());
/// ```
pub fn read_container_file<P: AsRef<Path>>(path: P) -> Result<NwbContainer, NwbError> {
    let file = File::open(path.as_ref())?;
    // 64KB buffer
    let mut reader = BufReader::with_capacity(65536, file);
    read_container(&mut reader)
}

/// Writes a container snapshot to a file, applying the compression policy
/// to every trace payload.
pub fn write_container_file<P: AsRef<Path>>(
    path: P,
    container: &NwbContainer,
    compression: Compression,
) -> Result<(), NwbError> {
    let file = File::create(path.as_ref())?;
    let mut writer = BufWriter::with_capacity(65536, file);
    write_container(&mut writer, container, compression)?;
    writer.flush()?;
    Ok(())
}

/// Reads a container snapshot from any seekable reader.
pub fn read_container<R: Read + Seek>(reader: &mut R) -> Result<NwbContainer, NwbError> {
    check_magic_number(reader)?;
    read_version_number(reader)?;

    let mut container = NwbContainer::default();
    container.session_description = read_string(reader)?;
    container.identifier = read_string(reader)?;

    let n_devices = reader.read_u32::<LittleEndian>()?;
    for _ in 0..n_devices {
        container.devices.push(Device {
            name: read_string(reader)?,
            description: read_string(reader)?,
            manufacturer: read_string(reader)?,
        });
    }

    let n_electrodes = reader.read_u32::<LittleEndian>()?;
    for _ in 0..n_electrodes {
        container.icephys_electrodes.push(IcephysElectrode {
            name: read_string(reader)?,
            description: read_string(reader)?,
            device_name: read_string(reader)?,
        });
    }

    let n_rows = reader.read_u64::<LittleEndian>()?;
    for _ in 0..n_rows {
        let electrode = read_string(reader)?;
        let response = read_series(reader)?;
        let has_stimulus = reader.read_u8()? != 0;
        let stimulus = if has_stimulus {
            Some(read_series(reader)?)
        } else {
            None
        };
        container.intracellular_recordings.push(IntracellularRecording {
            electrode,
            response,
            stimulus,
        });
    }

    let n_simultaneous = reader.read_u64::<LittleEndian>()?;
    for _ in 0..n_simultaneous {
        let recordings = read_index_list(reader, container.intracellular_recordings.len())?;
        container
            .simultaneous_recordings
            .push(SimultaneousRecording { recordings });
    }

    let n_sequential = reader.read_u64::<LittleEndian>()?;
    for _ in 0..n_sequential {
        let stimulus_type = read_string(reader)?;
        let simultaneous_recordings =
            read_index_list(reader, container.simultaneous_recordings.len())?;
        container.sequential_recordings.push(SequentialRecording {
            simultaneous_recordings,
            stimulus_type,
        });
    }

    let n_events = reader.read_u32::<LittleEndian>()?;
    for _ in 0..n_events {
        container.labeled_events.push(read_labeled_events(reader)?);
    }

    Ok(container)
}

/// Writes a container snapshot to any writer.
pub fn write_container<W: Write>(
    writer: &mut W,
    container: &NwbContainer,
    compression: Compression,
) -> Result<(), NwbError> {
    writer.write_u32::<LittleEndian>(NWB_MAGIC_NUMBER)?;
    writer.write_u16::<LittleEndian>(FORMAT_VERSION_MAJOR)?;
    writer.write_u16::<LittleEndian>(FORMAT_VERSION_MINOR)?;

    write_string(writer, &container.session_description)?;
    write_string(writer, &container.identifier)?;

    writer.write_u32::<LittleEndian>(container.devices.len() as u32)?;
    for device in &container.devices {
        write_string(writer, &device.name)?;
        write_string(writer, &device.description)?;
        write_string(writer, &device.manufacturer)?;
    }

    writer.write_u32::<LittleEndian>(container.icephys_electrodes.len() as u32)?;
    for electrode in &container.icephys_electrodes {
        write_string(writer, &electrode.name)?;
        write_string(writer, &electrode.description)?;
        write_string(writer, &electrode.device_name)?;
    }

    writer.write_u64::<LittleEndian>(container.intracellular_recordings.len() as u64)?;
    for row in &container.intracellular_recordings {
        write_string(writer, &row.electrode)?;
        write_series(writer, &row.response, compression)?;
        match &row.stimulus {
            Some(stimulus) => {
                writer.write_u8(1)?;
                write_series(writer, stimulus, compression)?;
            }
            None => writer.write_u8(0)?,
        }
    }

    writer.write_u64::<LittleEndian>(container.simultaneous_recordings.len() as u64)?;
    for group in &container.simultaneous_recordings {
        write_index_list(writer, &group.recordings)?;
    }

    writer.write_u64::<LittleEndian>(container.sequential_recordings.len() as u64)?;
    for group in &container.sequential_recordings {
        write_string(writer, &group.stimulus_type)?;
        write_index_list(writer, &group.simultaneous_recordings)?;
    }

    writer.write_u32::<LittleEndian>(container.labeled_events.len() as u32)?;
    for events in &container.labeled_events {
        write_labeled_events(writer, events)?;
    }

    Ok(())
}

/// Helper function to check the magic number that identifies container
/// snapshots
fn check_magic_number<R: Read>(reader: &mut R) -> Result<(), NwbError> {
    let magic_number = reader.read_u32::<LittleEndian>()?;
    if magic_number != NWB_MAGIC_NUMBER {
        return Err(NwbError::UnrecognizedFileFormat);
    }
    Ok(())
}

/// Helper function to read and validate the snapshot version
fn read_version_number<R: Read>(reader: &mut R) -> Result<(), NwbError> {
    let major = reader.read_u16::<LittleEndian>()?;
    let minor = reader.read_u16::<LittleEndian>()?;
    if major > FORMAT_VERSION_MAJOR {
        return Err(NwbError::UnsupportedVersion { major, minor });
    }
    Ok(())
}

/// Helper function to write a length-prefixed UTF-8 string
fn write_string<W: Write>(writer: &mut W, s: &str) -> Result<(), NwbError> {
    writer.write_u32::<LittleEndian>(s.len() as u32)?;
    writer.write_all(s.as_bytes())?;
    Ok(())
}

/// Helper function to read a length-prefixed UTF-8 string
///
/// The declared length is checked against the remaining file size before
/// any allocation.
fn read_string<R: Read + Seek>(reader: &mut R) -> Result<String, NwbError> {
    let length = reader.read_u32::<LittleEndian>()? as u64;

    let current_position = reader.stream_position()?;
    let file_length = reader.seek(SeekFrom::End(0))?;
    reader.seek(SeekFrom::Start(current_position))?;
    if length > file_length - current_position {
        return Err(NwbError::StringReadError);
    }

    let mut data = vec![0u8; length as usize];
    reader.read_exact(&mut data)?;
    String::from_utf8(data).map_err(|_| NwbError::StringReadError)
}

/// Helper function to write a list of table indices
fn write_index_list<W: Write>(writer: &mut W, indices: &[usize]) -> Result<(), NwbError> {
    writer.write_u64::<LittleEndian>(indices.len() as u64)?;
    for &index in indices {
        writer.write_u64::<LittleEndian>(index as u64)?;
    }
    Ok(())
}

/// Helper function to read a list of table indices, validating each one
/// against the referenced table's size
fn read_index_list<R: Read>(reader: &mut R, table_len: usize) -> Result<Vec<usize>, NwbError> {
    let n = reader.read_u64::<LittleEndian>()?;
    let mut indices = Vec::with_capacity(n as usize);
    for _ in 0..n {
        let index = reader.read_u64::<LittleEndian>()?;
        if index as usize >= table_len {
            return Err(NwbError::InvalidTableIndex(index));
        }
        indices.push(index as usize);
    }
    Ok(indices)
}

/// Helper function to write one patch-clamp series
fn write_series<W: Write>(
    writer: &mut W,
    series: &PatchClampSeries,
    compression: Compression,
) -> Result<(), NwbError> {
    writer.write_u8(series_kind_tag(series.kind))?;
    write_string(writer, &series.name)?;
    write_string(writer, &series.description)?;
    write_string(writer, &series.electrode)?;
    writer.write_f64::<LittleEndian>(series.starting_time)?;
    writer.write_f32::<LittleEndian>(series.rate)?;
    writer.write_f64::<LittleEndian>(series.conversion)?;
    writer.write_f64::<LittleEndian>(series.gain)?;
    write_trace(writer, &series.data, compression)
}

/// Helper function to read one patch-clamp series
fn read_series<R: Read + Seek>(reader: &mut R) -> Result<PatchClampSeries, NwbError> {
    let kind = series_kind_from_tag(reader.read_u8()?)?;
    let name = read_string(reader)?;
    let description = read_string(reader)?;
    let electrode = read_string(reader)?;
    let starting_time = reader.read_f64::<LittleEndian>()?;
    let rate = reader.read_f32::<LittleEndian>()?;
    let conversion = reader.read_f64::<LittleEndian>()?;
    let gain = reader.read_f64::<LittleEndian>()?;
    let data = read_trace(reader)?;
    Ok(PatchClampSeries {
        name,
        description,
        electrode,
        kind,
        data,
        starting_time,
        rate,
        conversion,
        gain,
    })
}

fn series_kind_tag(kind: SeriesKind) -> u8 {
    match kind {
        SeriesKind::VoltageClampSeries => 0,
        SeriesKind::CurrentClampSeries => 1,
        SeriesKind::IZeroClampSeries => 2,
        SeriesKind::VoltageClampStimulusSeries => 3,
        SeriesKind::CurrentClampStimulusSeries => 4,
    }
}

fn series_kind_from_tag(tag: u8) -> Result<SeriesKind, NwbError> {
    match tag {
        0 => Ok(SeriesKind::VoltageClampSeries),
        1 => Ok(SeriesKind::CurrentClampSeries),
        2 => Ok(SeriesKind::IZeroClampSeries),
        3 => Ok(SeriesKind::VoltageClampStimulusSeries),
        4 => Ok(SeriesKind::CurrentClampStimulusSeries),
        other => Err(NwbError::Other(format!("Invalid series kind tag {}", other))),
    }
}

/// Helper function to write one trace payload
///
/// Layout: dtype byte, compressed byte, sample count, stored byte length,
/// payload. Lazy traces must have been materialized before writing.
fn write_trace<W: Write>(
    writer: &mut W,
    data: &TraceData,
    compression: Compression,
) -> Result<(), NwbError> {
    let (dtype, n_samples, raw) = match data {
        TraceData::RawI32(samples) => {
            let mut raw = Vec::with_capacity(samples.len() * 4);
            for &value in samples {
                raw.write_i32::<LittleEndian>(value)?;
            }
            (DTYPE_I32, samples.len(), raw)
        }
        TraceData::F32(samples) => {
            let mut raw = Vec::with_capacity(samples.len() * 4);
            for &value in samples {
                raw.write_f32::<LittleEndian>(value)?;
            }
            (DTYPE_F32, samples.len(), raw)
        }
        TraceData::Lazy { .. } => {
            return Err(NwbError::Other(
                "Cannot write a lazy trace; materialize the container first".to_string(),
            ))
        }
    };

    let (compressed, stored) = match compression {
        Compression::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
            encoder.write_all(&raw)?;
            (1u8, encoder.finish()?)
        }
        Compression::None => (0u8, raw),
    };

    writer.write_u8(dtype)?;
    writer.write_u8(compressed)?;
    writer.write_u64::<LittleEndian>(n_samples as u64)?;
    writer.write_u64::<LittleEndian>(stored.len() as u64)?;
    writer.write_all(&stored)?;
    Ok(())
}

/// Helper function to read one trace payload
fn read_trace<R: Read>(reader: &mut R) -> Result<TraceData, NwbError> {
    let dtype = reader.read_u8()?;
    let compressed = reader.read_u8()? != 0;
    let n_samples = reader.read_u64::<LittleEndian>()? as usize;
    let stored_len = reader.read_u64::<LittleEndian>()? as usize;

    let mut stored = vec![0u8; stored_len];
    reader.read_exact(&mut stored)?;

    let raw = if compressed {
        let mut decoder = GzDecoder::new(&stored[..]);
        let mut raw = Vec::with_capacity(n_samples * 4);
        decoder.read_to_end(&mut raw)?;
        raw
    } else {
        stored
    };

    let mut cursor = Cursor::new(raw);
    match dtype {
        DTYPE_I32 => {
            let mut samples = Vec::with_capacity(n_samples);
            for _ in 0..n_samples {
                samples.push(cursor.read_i32::<LittleEndian>()?);
            }
            Ok(TraceData::RawI32(Array1::from(samples)))
        }
        DTYPE_F32 => {
            let mut samples = Vec::with_capacity(n_samples);
            for _ in 0..n_samples {
                samples.push(cursor.read_f32::<LittleEndian>()?);
            }
            Ok(TraceData::F32(Array1::from(samples)))
        }
        other => Err(NwbError::Other(format!("Invalid trace dtype tag {}", other))),
    }
}

/// Helper function to write one labeled-event series
fn write_labeled_events<W: Write>(writer: &mut W, events: &LabeledEvents) -> Result<(), NwbError> {
    write_string(writer, &events.name)?;
    write_string(writer, &events.description)?;
    writer.write_u64::<LittleEndian>(events.timestamps.len() as u64)?;
    for &t in &events.timestamps {
        writer.write_f64::<LittleEndian>(t)?;
    }
    for &label in &events.data {
        writer.write_i64::<LittleEndian>(label)?;
    }
    writer.write_u32::<LittleEndian>(events.labels.len() as u32)?;
    for label in &events.labels {
        write_string(writer, label)?;
    }
    Ok(())
}

/// Helper function to read one labeled-event series
fn read_labeled_events<R: Read + Seek>(reader: &mut R) -> Result<LabeledEvents, NwbError> {
    let name = read_string(reader)?;
    let description = read_string(reader)?;
    let n = reader.read_u64::<LittleEndian>()? as usize;
    let mut timestamps = Vec::with_capacity(n);
    for _ in 0..n {
        timestamps.push(reader.read_f64::<LittleEndian>()?);
    }
    let mut data = Vec::with_capacity(n);
    for _ in 0..n {
        data.push(reader.read_i64::<LittleEndian>()?);
    }
    let n_labels = reader.read_u32::<LittleEndian>()?;
    let mut labels = Vec::with_capacity(n_labels as usize);
    for _ in 0..n_labels {
        labels.push(read_string(reader)?);
    }
    Ok(LabeledEvents {
        name,
        description,
        timestamps,
        data,
        labels,
    })
}
