use crate::value::Value;

/// A bound parameter: a single value or a list to expand.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Scalar(Value),
    List(Vec<Value>),
}

impl ParamValue {
    pub fn list<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        ParamValue::List(values.into_iter().map(Into::into).collect())
    }

    pub fn is_list(&self) -> bool {
        matches!(self, ParamValue::List(_))
    }

    /// Short name used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            ParamValue::Scalar(value) => value.kind(),
            ParamValue::List(_) => "list",
        }
    }
}

impl From<Value> for ParamValue {
    fn from(value: Value) -> Self {
        ParamValue::Scalar(value)
    }
}

/// Ordered parameters. Names compare case-insensitively.
///
/// ```
/// use zero_mapper::sql::Params;
///
/// let params = Params::new()
///     .bind("name", "alice")
///     .bind_list("ids", [1, 2, 3]);
/// assert_eq!(params.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    entries: Vec<(String, ParamValue)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name`, replacing a previous binding of the same name.
    pub fn bind(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set(name, ParamValue::Scalar(value.into()));
        self
    }

    pub fn bind_list<I, V>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.set(name, ParamValue::list(values));
        self
    }

    /// Append a positional parameter, named `p{index}`.
    pub fn push(&mut self, value: impl Into<Value>) {
        let name = format!("p{}", self.entries.len());
        self.entries.push((name, ParamValue::Scalar(value.into())));
    }

    /// Bind `name`; a leading `@` or `:` is ignored.
    pub fn set(&mut self, name: &str, value: ParamValue) {
        let name = name.trim_start_matches(['@', ':']);
        match self.position(name) {
            Some(index) => self.entries[index].1 = value,
            None => self.entries.push((name.to_owned(), value)),
        }
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(entry, _)| entry.eq_ignore_ascii_case(name))
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.position(name).map(|index| &self.entries[index].1)
    }

    /// The entry at insertion position `index`.
    pub fn get_index(&self, index: usize) -> Option<(&str, &ParamValue)> {
        self.entries
            .get(index)
            .map(|(name, value)| (name.as_str(), value))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Params
where
    K: AsRef<str>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (name, value) in iter {
            params.set(name.as_ref(), ParamValue::Scalar(value.into()));
        }
        params
    }
}
