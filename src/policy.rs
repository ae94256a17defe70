//! Bad-example and truncation policies shared by the CSV and
//! RecordIO-Protobuf decoders and reflected up to the parallel engine
//! (§4.F's bad-example table, §4.I's `max_field_length_handling`).

/// How a decoder reacts to a single malformed instance within an
/// otherwise valid batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadExampleHandling {
    /// Raise `InvalidInstanceError`; surfaces to the client.
    Error,
    /// Silently drop the batch and advance.
    Skip,
    /// Drop the batch, advance, and log a structured warning.
    SkipWarn,
    /// Decode good instances, leave the bad row's slot zero-filled.
    Pad,
    /// Same as `Pad`, plus a structured warning.
    PadWarn,
}

impl BadExampleHandling {
    pub fn warns(&self) -> bool {
        matches!(self, BadExampleHandling::SkipWarn | BadExampleHandling::PadWarn)
    }

    pub fn pads(&self) -> bool {
        matches!(self, BadExampleHandling::Pad | BadExampleHandling::PadWarn)
    }

    pub fn skips(&self) -> bool {
        matches!(self, BadExampleHandling::Skip | BadExampleHandling::SkipWarn)
    }
}

/// What to do with a CSV field that hit `max_field_length` (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxFieldLengthHandling {
    TreatAsBad,
    Truncate,
    TruncateWarn,
}
