use std::fmt;

/// Progress of a single checkout, as reported in the logs.
///
/// `Started → (Validating → Reserved)* → Persisting → Committed`, or `Aborted` from any
/// phase before `Committed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutPhase {
    Started,
    /// Looking up a product and locking its stock.
    Validating,
    /// Stock for the current item has been decremented inside the unit.
    Reserved,
    Persisting,
    Committed,
    Aborted,
}

impl CheckoutPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutPhase::Started => "started",
            CheckoutPhase::Validating => "validating",
            CheckoutPhase::Reserved => "reserved",
            CheckoutPhase::Persisting => "persisting",
            CheckoutPhase::Committed => "committed",
            CheckoutPhase::Aborted => "aborted",
        }
    }
}

impl fmt::Display for CheckoutPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
