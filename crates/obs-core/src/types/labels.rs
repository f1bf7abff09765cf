//! Label tuples: the ordered label values that key one observed series.

/// Ordered, already-normalized label values.
///
/// Built by [`LabelNormalizer::tuple`](crate::label::LabelNormalizer::tuple)
/// for free-text names, or from values that are metric-safe by construction
/// (trade types, configured tickers).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelTuple(Vec<String>);

impl LabelTuple {
    pub fn new(values: Vec<String>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrowed view in the shape the Prometheus vector API wants.
    pub fn as_strs(&self) -> Vec<&str> {
        self.0.iter().map(String::as_str).collect()
    }
}

impl<const N: usize> From<[&str; N]> for LabelTuple {
    fn from(values: [&str; N]) -> Self {
        Self(values.iter().map(|v| v.to_string()).collect())
    }
}

impl std::fmt::Display for LabelTuple {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({})", self.0.join(","))
    }
}
