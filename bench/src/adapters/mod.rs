pub use self::{std::RwLockStdHashMapTable, striped::StripedTable};

mod std;
mod striped;

/// bustle generates `u64` keys; the table only takes strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Key(String);

impl From<u64> for Key {
    fn from(key: u64) -> Self {
        Key(format!("{key:016x}"))
    }
}

impl Key {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
