mod events;
mod reader;
mod recordings;
pub mod types;
mod units;
mod writer;

// Re-export types
pub use types::*;

pub use events::{dense_labels_to_events, labeled_events_from_dense};
pub use reader::{AcquisitionReader, StimulusProtocol};
pub use recordings::{
    add_all, add_device_from_metadata, add_icephys_electrodes, add_icephys_recordings,
};
pub use units::conversion_from_unit;
pub use writer::{
    default_conversion_metadata, materialize_traces, new_container, read_container,
    read_container_file, write_container, write_container_file, write_reader_to_nwb,
};

/// Writes one acquisition source to an NWB-style container file.
///
/// Thin wrapper over [`write_reader_to_nwb`] with default options and
/// auto-generated metadata. Appends to `save_path` if it already holds a
/// container snapshot.
///
/// # Examples
///
/// ```no_run
/// use nwb_converter::{convert, AcquisitionReader};
///
/// fn run<R: AcquisitionReader>(reader: &R) {
///     match convert(reader, "session.nwb") {
///         Ok(diagnostics) => println!("Converted with {} warnings", diagnostics.len()),
///         Err(e) => println!("Error converting file: {}", e),
///     }
/// }
/// ```
pub fn convert<R: AcquisitionReader + ?Sized, P: AsRef<std::path::Path>>(
    reader: &R,
    save_path: P,
) -> Result<Diagnostics, NwbError> {
    writer::write_reader_to_nwb(reader, save_path, false, None, &RecordingOptions::default())
}
