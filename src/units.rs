use crate::types::{DiagnosticKind, Diagnostics};

/// Returns the multiplicative conversion from a raw unit string into the SI
/// base unit (volt or ampere).
///
/// The lookup is an exact, case-sensitive match against the fixed table of
/// pico/nano/micro/milli/unit prefixes for volts and amperes. An unknown
/// unit resolves to 1.0 with an `UnknownUnit` diagnostic, which may be
/// wrong, but lets the conversion proceed.
///
/// # Examples
///
/// ```
/// use nwb_converter::{conversion_from_unit, Diagnostics};
///
/// let mut diagnostics = Diagnostics::new();
/// assert_eq!(conversion_from_unit("pA", &mut diagnostics), 1e-12);
/// assert_eq!(conversion_from_unit("mV", &mut diagnostics), 1e-3);
/// assert!(diagnostics.is_empty());
/// ```
pub fn conversion_from_unit(unit: &str, diagnostics: &mut Diagnostics) -> f64 {
    match unit {
        "pA" | "pV" => 1e-12,
        "nA" | "nV" => 1e-9,
        "uA" | "uV" => 1e-6,
        "mA" | "mV" => 1e-3,
        "A" | "V" => 1.0,
        other => {
            diagnostics.warn(
                DiagnosticKind::UnknownUnit,
                format!(
                    "No valid units found for traces in the current file ('{}'). \
                     Conversion is set to 1, but this might be wrong.",
                    other
                ),
            );
            1.0
        }
    }
}
