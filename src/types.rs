use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::io;
use std::str::FromStr;

/// A recording device entry in the container.
///
/// Created once per source (or from caller metadata) and referenced by
/// electrodes through its name.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    /// Name of the device (unique within a container)
    pub name: String,
    /// Free-form description of the device
    pub description: String,
    /// Manufacturer of the device
    pub manufacturer: String,
}

/// An intracellular electrode entry in the container.
///
/// The electrode set is append-only and keyed by name. Every electrode
/// references an existing device by name.
#[derive(Debug, Clone, PartialEq)]
pub struct IcephysElectrode {
    /// Name of the electrode (unique within a container)
    pub name: String,
    /// Recording description (e.g. whole-cell, sharp, etc.)
    pub description: String,
    /// Name of the device this electrode is attached to
    pub device_name: String,
}

/// Kind of a patch-clamp series, mirroring the container model's
/// response/stimulus series classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesKind {
    /// Response measured under voltage clamp (stores current)
    VoltageClampSeries,
    /// Response measured under current clamp (stores voltage)
    CurrentClampSeries,
    /// Response with the current clamped to zero (stores voltage)
    IZeroClampSeries,
    /// Driving stimulus of a voltage-clamp experiment (stores voltage)
    VoltageClampStimulusSeries,
    /// Driving stimulus of a current-clamp experiment (stores current)
    CurrentClampStimulusSeries,
}

impl SeriesKind {
    /// Returns the SI base unit the series data converts into.
    pub fn si_unit(&self) -> &'static str {
        match self {
            SeriesKind::VoltageClampSeries => "amperes",
            SeriesKind::CurrentClampSeries => "volts",
            SeriesKind::IZeroClampSeries => "volts",
            SeriesKind::VoltageClampStimulusSeries => "volts",
            SeriesKind::CurrentClampStimulusSeries => "amperes",
        }
    }

    /// Returns true for the stimulus variants.
    pub fn is_stimulus(&self) -> bool {
        matches!(
            self,
            SeriesKind::VoltageClampStimulusSeries | SeriesKind::CurrentClampStimulusSeries
        )
    }
}

/// Sample buffer of a patch-clamp series.
///
/// Response data stays `Lazy` (a reference back into the reader) until write
/// time, so the compression policy is applied when the container is flushed
/// rather than during assembly.
#[derive(Debug, Clone, PartialEq)]
pub enum TraceData {
    /// Raw integer samples as delivered by the acquisition reader
    RawI32(Array1<i32>),
    /// Floating-point samples (command/stimulus traces)
    F32(Array1<f32>),
    /// Deferred fetch of a raw chunk by (block, segment, channel)
    Lazy {
        /// Block index within the source file
        block: usize,
        /// Segment index within the block
        segment: usize,
        /// Channel index within the segment
        channel: usize,
    },
}

impl TraceData {
    /// Number of samples, or `None` if the buffer has not been materialized.
    pub fn len(&self) -> Option<usize> {
        match self {
            TraceData::RawI32(data) => Some(data.len()),
            TraceData::F32(data) => Some(data.len()),
            TraceData::Lazy { .. } => None,
        }
    }

    /// Returns true if the buffer is materialized and empty.
    pub fn is_empty(&self) -> bool {
        self.len() == Some(0)
    }
}

/// One response or stimulus record.
///
/// `conversion` already folds the reader-reported channel gain into the
/// unit factor; `gain` itself is stored as `NaN` to mark it unused.
#[derive(Debug, Clone)]
pub struct PatchClampSeries {
    /// Name of the series (unique within a container)
    pub name: String,
    /// Free-form description
    pub description: String,
    /// Name of the electrode this series was recorded on
    pub electrode: String,
    /// Response/stimulus series kind
    pub kind: SeriesKind,
    /// Sample buffer
    pub data: TraceData,
    /// Absolute starting time (seconds)
    pub starting_time: f64,
    /// Sampling rate (Hz)
    pub rate: f32,
    /// Multiplicative factor from raw samples into the SI base unit
    pub conversion: f64,
    /// Amplifier gain; stored as NaN since gain is folded into `conversion`
    pub gain: f64,
}

impl PatchClampSeries {
    /// Returns the SI base unit of the converted data.
    pub fn unit(&self) -> &'static str {
        self.kind.si_unit()
    }
}

/// One row of the intracellular-recordings table: a response, an optional
/// paired stimulus, and the electrode both were captured on.
#[derive(Debug, Clone)]
pub struct IntracellularRecording {
    /// Name of the electrode
    pub electrode: String,
    /// Response record
    pub response: PatchClampSeries,
    /// Paired stimulus record (absent for i-zero experiments)
    pub stimulus: Option<PatchClampSeries>,
}

/// One row of the simultaneous-recordings table: the intracellular-recording
/// rows captured concurrently in one segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimultaneousRecording {
    /// Indices into the intracellular-recordings table
    pub recordings: Vec<usize>,
}

/// One row of the sequential-recordings table: the ordered simultaneous
/// recordings belonging to one session/source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequentialRecording {
    /// Indices into the simultaneous-recordings table
    pub simultaneous_recordings: Vec<usize>,
    /// Stimulus-type label for the session
    pub stimulus_type: String,
}

/// Sparse labeled events derived from a dense per-sample label sequence
/// (e.g. behavioral syllable onsets).
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledEvents {
    /// Name of the event series
    pub name: String,
    /// Free-form description
    pub description: String,
    /// Onset time of each event (seconds)
    pub timestamps: Vec<f64>,
    /// Label value switched to at each event
    pub data: Vec<i64>,
    /// Display names covering every label value from 0 to the maximum
    pub labels: Vec<String>,
}

/// Running offsets into the container tables, recomputed once at the start
/// of each append call.
///
/// These guarantee that appending a second source file never collides with
/// indices produced by a prior append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendOffsets {
    /// Index the next intracellular-recording row will receive
    pub row_offset: usize,
    /// Current count of simultaneous-recording groups
    pub simultaneous_offset: usize,
    /// Current count of sequential-recording groups
    pub sequential_offset: usize,
}

/// In-memory NWB-style container.
///
/// Holds the device and electrode tables plus the three append-only
/// recording tables. Rows are write-once: they are appended during assembly
/// and never mutated afterwards.
///
/// # Examples
///
/// ```
/// use nwb_converter::NwbContainer;
///
/// let container = NwbContainer::new("my session", "session-001");
/// assert!(container.devices.is_empty());
/// assert_eq!(container.append_offsets().row_offset, 0);
/// ```
#[derive(Debug, Clone, Default)]
pub struct NwbContainer {
    /// Description of the recording session
    pub session_description: String,
    /// Unique identifier of the container
    pub identifier: String,
    /// Device table
    pub devices: Vec<Device>,
    /// Intracellular electrode table (append-only, keyed by name)
    pub icephys_electrodes: Vec<IcephysElectrode>,
    /// Intracellular-recordings table (row indices strictly increasing,
    /// never reused across appends)
    pub intracellular_recordings: Vec<IntracellularRecording>,
    /// Simultaneous-recordings table
    pub simultaneous_recordings: Vec<SimultaneousRecording>,
    /// Sequential-recordings table
    pub sequential_recordings: Vec<SequentialRecording>,
    /// Processed labeled-event series
    pub labeled_events: Vec<LabeledEvents>,
}

impl NwbContainer {
    /// Creates an empty container with the given session description and
    /// identifier.
    pub fn new(session_description: &str, identifier: &str) -> Self {
        NwbContainer {
            session_description: session_description.to_string(),
            identifier: identifier.to_string(),
            ..Default::default()
        }
    }

    /// Looks up a device by name.
    pub fn device(&self, name: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.name == name)
    }

    /// Returns true if a device with this name exists.
    pub fn has_device(&self, name: &str) -> bool {
        self.device(name).is_some()
    }

    /// Adds a device unless one with the same name already exists.
    /// Returns true if the device was added.
    pub fn add_device(&mut self, device: Device) -> bool {
        if self.has_device(&device.name) {
            return false;
        }
        self.devices.push(device);
        true
    }

    /// Looks up an electrode by name.
    pub fn electrode(&self, name: &str) -> Option<&IcephysElectrode> {
        self.icephys_electrodes.iter().find(|e| e.name == name)
    }

    /// Returns true if an electrode with this name exists.
    pub fn has_electrode(&self, name: &str) -> bool {
        self.electrode(name).is_some()
    }

    /// Adds an electrode unless one with the same name already exists.
    /// Returns true if the electrode was added.
    pub fn add_electrode(&mut self, electrode: IcephysElectrode) -> bool {
        if self.has_electrode(&electrode.name) {
            return false;
        }
        self.icephys_electrodes.push(electrode);
        true
    }

    /// Appends one intracellular-recording row and returns its row index.
    pub fn add_intracellular_recording(&mut self, recording: IntracellularRecording) -> usize {
        self.intracellular_recordings.push(recording);
        self.intracellular_recordings.len() - 1
    }

    /// Appends one simultaneous-recording group and returns its index.
    pub fn add_simultaneous_recording(&mut self, recordings: Vec<usize>) -> usize {
        self.simultaneous_recordings
            .push(SimultaneousRecording { recordings });
        self.simultaneous_recordings.len() - 1
    }

    /// Appends one sequential-recording group and returns its index.
    pub fn add_sequential_recording(
        &mut self,
        simultaneous_recordings: Vec<usize>,
        stimulus_type: &str,
    ) -> usize {
        self.sequential_recordings.push(SequentialRecording {
            simultaneous_recordings,
            stimulus_type: stimulus_type.to_string(),
        });
        self.sequential_recordings.len() - 1
    }

    /// Appends one labeled-event series to the processing list.
    pub fn add_labeled_events(&mut self, events: LabeledEvents) {
        self.labeled_events.push(events);
    }

    /// Recomputes the running table offsets from the current table sizes.
    pub fn append_offsets(&self) -> AppendOffsets {
        AppendOffsets {
            row_offset: self.intracellular_recordings.len(),
            simultaneous_offset: self.simultaneous_recordings.len(),
            sequential_offset: self.sequential_recordings.len(),
        }
    }
}

/// Type of an intracellular (icephys) experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExperimentType {
    /// Membrane held at a command voltage; current is recorded
    VoltageClamp,
    /// A command current is injected; voltage is recorded
    CurrentClamp,
    /// No driving stimulus (current clamped to zero)
    IZero,
}

impl ExperimentType {
    /// Returns the canonical lowercase name of the experiment type.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExperimentType::VoltageClamp => "voltage_clamp",
            ExperimentType::CurrentClamp => "current_clamp",
            ExperimentType::IZero => "izero",
        }
    }

    /// Series kind used for response records of this experiment type.
    pub fn response_kind(&self) -> SeriesKind {
        match self {
            ExperimentType::VoltageClamp => SeriesKind::VoltageClampSeries,
            ExperimentType::CurrentClamp => SeriesKind::CurrentClampSeries,
            ExperimentType::IZero => SeriesKind::IZeroClampSeries,
        }
    }

    /// Series kind used for stimulus records, or `None` for the
    /// no-stimulus variant.
    pub fn stimulus_kind(&self) -> Option<SeriesKind> {
        match self {
            ExperimentType::VoltageClamp => Some(SeriesKind::VoltageClampStimulusSeries),
            ExperimentType::CurrentClamp => Some(SeriesKind::CurrentClampStimulusSeries),
            ExperimentType::IZero => None,
        }
    }
}

impl FromStr for ExperimentType {
    type Err = NwbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "voltage_clamp" => Ok(ExperimentType::VoltageClamp),
            "current_clamp" => Ok(ExperimentType::CurrentClamp),
            "izero" => Ok(ExperimentType::IZero),
            other => Err(NwbError::InvalidExperimentType(other.to_string())),
        }
    }
}

impl fmt::Display for ExperimentType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Compression policy applied to trace payloads when the container is
/// written to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// Gzip-compress each trace payload
    #[default]
    Gzip,
    /// Store trace payloads uncompressed
    None,
}

/// Knobs for one append call.
#[derive(Debug, Clone)]
pub struct RecordingOptions {
    /// Requested experiment type. Downgraded to `IZero` when the source
    /// contains no stimulus commands.
    pub experiment_type: ExperimentType,
    /// Compression policy used at write time
    pub compression: Compression,
    /// Electrode indices to skip during assembly
    pub skip_electrodes: Vec<usize>,
}

impl Default for RecordingOptions {
    fn default() -> Self {
        RecordingOptions {
            experiment_type: ExperimentType::VoltageClamp,
            compression: Compression::Gzip,
            skip_electrodes: Vec::new(),
        }
    }
}

/// Metadata for the container itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NwbFileMetadata {
    /// Description of the recording session
    #[serde(default)]
    pub session_description: Option<String>,
    /// Unique identifier of the container
    #[serde(default)]
    pub identifier: Option<String>,
}

/// Metadata for one device.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceMetadata {
    /// Name of the device
    pub name: String,
    /// Free-form description
    #[serde(default)]
    pub description: Option<String>,
    /// Manufacturer of the device
    #[serde(default)]
    pub manufacturer: Option<String>,
}

/// Metadata for one electrode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectrodeMetadata {
    /// Name of the electrode
    pub name: String,
    /// Recording description
    #[serde(default)]
    pub description: Option<String>,
    /// Name of the device this electrode should link to
    #[serde(default)]
    pub device_name: Option<String>,
}

/// Metadata for one session (one source file). One entry is consumed per
/// append call, selected by the running sequential-recording offset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetadata {
    /// Start time of this session relative to the first session (seconds)
    #[serde(default)]
    pub relative_session_start_time: f64,
    /// Stimulus-type label for the session
    #[serde(default = "default_stimulus_type")]
    pub stimulus_type: String,
}

pub(crate) fn default_stimulus_type() -> String {
    "not described".to_string()
}

/// Intracellular-recording metadata block.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IcephysMetadata {
    /// Device entries
    #[serde(rename = "Device", default)]
    pub devices: Vec<DeviceMetadata>,
    /// Electrode entries
    #[serde(rename = "Electrodes", default)]
    pub electrodes: Vec<ElectrodeMetadata>,
    /// Per-session entries, in append order
    #[serde(rename = "Sessions", default)]
    pub sessions: Vec<SessionMetadata>,
}

/// Caller-supplied conversion metadata.
///
/// # Examples
///
/// ```
/// use nwb_converter::ConversionMetadata;
///
/// let metadata = ConversionMetadata::from_json(r#"{
///     "Icephys": {
///         "Device": [{"name": "Axopatch 200B"}],
///         "Sessions": [{"relative_session_start_time": 0.0, "stimulus_type": "square pulse"}]
///     }
/// }"#).unwrap();
/// assert_eq!(metadata.icephys.devices[0].name, "Axopatch 200B");
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionMetadata {
    /// Container-level metadata
    #[serde(rename = "NWBFile", default)]
    pub nwb_file: NwbFileMetadata,
    /// Intracellular-recording metadata
    #[serde(rename = "Icephys", default)]
    pub icephys: IcephysMetadata,
}

impl ConversionMetadata {
    /// Parses conversion metadata from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, NwbError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Loads conversion metadata from a JSON file.
    pub fn from_json_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, NwbError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }
}

/// Kind of a non-fatal diagnostic raised during assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// Unit string not in the fixed conversion table; factor defaulted to 1.0
    UnknownUnit,
    /// Container had no devices; a default device was created
    MissingDevice,
    /// Container had no electrodes; defaults were synthesized
    MissingElectrodes,
    /// An electrode referenced a device that did not exist; it was created
    MissingDeviceLink,
    /// The source file has no stimulus-protocol section
    NoStimulusProtocol,
    /// Experiment type was forced to i-zero because no commands were found
    ExperimentTypeDowngrade,
    /// No session metadata entry for this append; defaults were used
    MissingSessionMetadata,
}

/// One non-fatal diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// What kind of default-filling happened
    pub kind: DiagnosticKind,
    /// Human-readable explanation
    pub message: String,
}

/// Collector for non-fatal diagnostics.
///
/// Several diagnostics may accumulate in one run; they represent recoverable
/// default-filling, not data corruption. Fatal conditions are reported
/// through [`NwbError`] instead.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Creates an empty collector.
    pub fn new() -> Self {
        Diagnostics::default()
    }

    /// Records one diagnostic.
    pub fn warn<S: Into<String>>(&mut self, kind: DiagnosticKind, message: S) {
        self.items.push(Diagnostic {
            kind,
            message: message.into(),
        });
    }

    /// All recorded diagnostics, in the order they fired.
    pub fn items(&self) -> &[Diagnostic] {
        &self.items
    }

    /// Number of recorded diagnostics.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of diagnostics of one kind.
    pub fn count_of(&self, kind: DiagnosticKind) -> usize {
        self.items.iter().filter(|d| d.kind == kind).count()
    }

    /// Moves all diagnostics from `other` into this collector.
    pub fn extend(&mut self, other: Diagnostics) {
        self.items.extend(other.items);
    }
}

/// Custom error types for the converter.
///
/// Fatal/structural conditions abort the whole append operation for the
/// current source file; reader and I/O failures are passed through
/// unmodified.
#[derive(Debug)]
pub enum NwbError {
    /// Source file contains a nonzero command count that differs from its
    /// segment count
    SegmentCommandMismatch {
        /// Number of segments reported by the reader
        n_segments: usize,
        /// Number of stimulus commands reported by the protocol
        n_commands: usize,
    },
    /// Experiment type name was not one of the allowed values
    InvalidExperimentType(String),
    /// The file was not recognized as a container snapshot
    UnrecognizedFileFormat,
    /// The container snapshot version is newer than this library supports
    UnsupportedVersion {
        /// Major version found in the file
        major: u16,
        /// Minor version found in the file
        minor: u16,
    },
    /// Error reading a string from a container snapshot
    StringReadError,
    /// A container snapshot row referenced a table index that does not exist
    InvalidTableIndex(u64),
    /// Malformed caller-supplied metadata
    MetadataError(serde_json::Error),
    /// An I/O error occurred
    IoError(io::Error),
    /// An error raised by the acquisition reader
    Reader(String),
    /// A general error with a custom message
    Other(String),
}

impl fmt::Display for NwbError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NwbError::SegmentCommandMismatch {
                n_segments,
                n_commands,
            } => write!(
                f,
                "File contains inconsistent number of segments ({}) and commands ({})",
                n_segments, n_commands
            ),
            NwbError::InvalidExperimentType(name) => write!(
                f,
                "Experiment type should be 'voltage_clamp', 'current_clamp' or 'izero', \
                 but received '{}'",
                name
            ),
            NwbError::UnrecognizedFileFormat => write!(f, "Unrecognized file format"),
            NwbError::UnsupportedVersion { major, minor } => {
                write!(f, "Unsupported container version {}.{}", major, minor)
            }
            NwbError::StringReadError => write!(f, "Error reading string from file"),
            NwbError::InvalidTableIndex(index) => {
                write!(f, "Table references row {} which does not exist", index)
            }
            NwbError::MetadataError(e) => write!(f, "Malformed metadata: {}", e),
            NwbError::IoError(e) => write!(f, "IO error: {}", e),
            NwbError::Reader(msg) => write!(f, "Reader error: {}", msg),
            NwbError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl Error for NwbError {}

impl From<io::Error> for NwbError {
    fn from(error: io::Error) -> Self {
        NwbError::IoError(error)
    }
}

impl From<serde_json::Error> for NwbError {
    fn from(error: serde_json::Error) -> Self {
        NwbError::MetadataError(error)
    }
}
