//! Consumer group data structures

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};

/// JSON requires string keys, so (instance, partition) is written as
/// "instance:partition"
mod cursor_map_serde {
    use super::*;

    pub fn serialize<S>(
        map: &BTreeMap<(String, u32), GroupCursorState>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeMap;
        let mut ser_map = serializer.serialize_map(Some(map.len()))?;
        for ((instance, partition), value) in map {
            let key = format!("{}:{}", instance, partition);
            ser_map.serialize_entry(&key, value)?;
        }
        ser_map.end()
    }

    pub fn deserialize<'de, D>(
        deserializer: D,
    ) -> Result<BTreeMap<(String, u32), GroupCursorState>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let string_map: BTreeMap<String, GroupCursorState> = BTreeMap::deserialize(deserializer)?;
        let mut result = BTreeMap::new();
        for (key, value) in string_map {
            let (instance, partition) = key
                .rsplit_once(':')
                .ok_or_else(|| serde::de::Error::custom(format!("bad cursor key '{}'", key)))?;
            let partition = partition.parse::<u32>().map_err(serde::de::Error::custom)?;
            result.insert((instance.to_string(), partition), value);
        }
        Ok(result)
    }
}

/// Position of one group member on one partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupCursorState {
    /// Next offset this member will read
    pub offset: i64,

    /// Advance the position as part of every read
    pub commit_on_get: bool,

    /// Last time the position was set (milliseconds since epoch)
    pub updated_at_ms: i64,
}

/// A consumer group of one stream
///
/// Groups only scope positions; there is no membership protocol or
/// rebalancing. Members are the instance names holding a cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerGroup {
    pub stream_id: String,
    pub name: String,
    pub created_at_ms: i64,

    /// Positions by (instance, partition)
    #[serde(with = "cursor_map_serde")]
    pub cursors: BTreeMap<(String, u32), GroupCursorState>,
}

impl ConsumerGroup {
    pub fn new(stream_id: impl Into<String>, name: impl Into<String>, now_ms: i64) -> Self {
        Self {
            stream_id: stream_id.into(),
            name: name.into(),
            created_at_ms: now_ms,
            cursors: BTreeMap::new(),
        }
    }

    /// Instance names holding at least one cursor
    pub fn members(&self) -> BTreeSet<String> {
        self.cursors
            .keys()
            .map(|(instance, _)| instance.clone())
            .collect()
    }

    pub fn cursor(&self, instance: &str, partition: u32) -> Option<&GroupCursorState> {
        self.cursors.get(&(instance.to_string(), partition))
    }

    /// Set a position unconditionally (cursor creation)
    pub fn reset(&mut self, instance: &str, partition: u32, offset: i64, commit_on_get: bool, now_ms: i64) {
        self.cursors.insert(
            (instance.to_string(), partition),
            GroupCursorState {
                offset,
                commit_on_get,
                updated_at_ms: now_ms,
            },
        );
    }

    /// Move a position forward. Returns the resulting offset, or `None` if
    /// the cursor does not exist. Positions never move backwards.
    pub fn advance(&mut self, instance: &str, partition: u32, offset: i64, now_ms: i64) -> Option<i64> {
        let state = self.cursors.get_mut(&(instance.to_string(), partition))?;
        if offset > state.offset {
            state.offset = offset;
            state.updated_at_ms = now_ms;
        }
        Some(state.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_is_forward_only() {
        let mut group = ConsumerGroup::new("s", "g", 0);
        group.reset("i-1", 0, 5, true, 0);

        assert_eq!(group.advance("i-1", 0, 9, 1), Some(9));
        assert_eq!(group.advance("i-1", 0, 3, 2), Some(9));
        assert_eq!(group.cursor("i-1", 0).unwrap().updated_at_ms, 1);
        assert_eq!(group.advance("i-2", 0, 3, 2), None);

        group.reset("i-1", 0, 0, true, 3);
        assert_eq!(group.cursor("i-1", 0).unwrap().offset, 0);
    }

    #[test]
    fn test_members() {
        let mut group = ConsumerGroup::new("s", "g", 0);
        group.reset("a", 0, 0, true, 0);
        group.reset("a", 1, 0, true, 0);
        group.reset("b", 1, 0, false, 0);
        let members: Vec<String> = group.members().into_iter().collect();
        assert_eq!(members, vec!["a", "b"]);
    }

    #[test]
    fn test_json_roundtrip_with_tuple_keys() {
        let mut group = ConsumerGroup::new("s", "g", 7);
        group.reset("worker.1", 3, 42, false, 8);

        let json = serde_json::to_string(&group).unwrap();
        assert!(json.contains("\"worker.1:3\""));
        let back: ConsumerGroup = serde_json::from_str(&json).unwrap();
        assert_eq!(back, group);
    }
}
