use std::fmt;

use thiserror::Error;

/// Stable integer identity handed out for every live tree node.
/// 每個存活節點所持有的穩定整數代號。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(u32);

impl ItemId {
    /// "No item"; returned where a sibling or child does not exist.
    /// 代表「無節點」，用於不存在的兄弟或子節點。
    pub const NIL: ItemId = ItemId(u32::MAX);
    /// The project root. Never allocated from a table.
    /// 專案根節點，永遠不會由表格配發。
    pub const ROOT: ItemId = ItemId(u32::MAX - 1);

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn as_u32(self) -> u32 {
        self.0
    }

    pub fn is_nil(self) -> bool {
        self == Self::NIL
    }

    pub fn is_root(self) -> bool {
        self == Self::ROOT
    }

    /// True for the two reserved values.
    /// 是否為保留的哨兵值。
    pub fn is_sentinel(self) -> bool {
        self.0 >= Self::ROOT.0
    }

    fn slot(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ItemId::NIL => f.write_str("nil"),
            ItemId::ROOT => f.write_str("root"),
            ItemId(raw) => write!(f, "{raw}"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandleTableError {
    #[error("handle {0} is reserved and cannot hold an entry")]
    Reserved(ItemId),
}

/// Growable slot table mapping handles to values.
/// 以可成長的槽位陣列把代號對應到值。
///
/// Removal tombstones a slot instead of compacting; freed slots are handed
/// out again by later [`HandleTable::add`] calls, most recently freed first.
/// 移除只會留下墓碑而不壓縮；釋放的槽位會在之後的 `add` 中重新配發（後進先出）。
#[derive(Debug, Clone)]
pub struct HandleTable<T> {
    slots: Vec<Option<T>>,
    free: Vec<u32>,
    live: usize,
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> HandleTable<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    /// Stores a value and returns its handle.
    /// 儲存值並回傳其代號。
    pub fn add(&mut self, value: T) -> ItemId {
        // Slots adopted through `replace` may still sit on the free list.
        while let Some(raw) = self.free.pop() {
            let slot = &mut self.slots[raw as usize];
            if slot.is_none() {
                *slot = Some(value);
                self.live += 1;
                return ItemId(raw);
            }
        }
        let raw = self.slots.len() as u32;
        self.slots.push(Some(value));
        self.live += 1;
        ItemId(raw)
    }

    /// Tombstones the slot and returns the value it held.
    /// 將槽位標為墓碑並回傳原本的值。
    pub fn remove(&mut self, id: ItemId) -> Option<T> {
        let value = self.slots.get_mut(id.slot())?.take()?;
        self.free.push(id.0);
        self.live -= 1;
        Some(value)
    }

    /// Places `value` at `id` without allocating a new handle.
    /// 不配發新代號，直接把值放到指定槽位。
    pub fn replace(&mut self, id: ItemId, value: T) -> Result<Option<T>, HandleTableError> {
        if id.is_sentinel() {
            return Err(HandleTableError::Reserved(id));
        }
        if id.slot() >= self.slots.len() {
            let first_new = self.slots.len() as u32;
            self.slots.resize_with(id.slot() + 1, || None);
            self.free.extend(first_new..id.0);
        }
        let previous = self.slots[id.slot()].replace(value);
        if previous.is_none() {
            self.live += 1;
        }
        Ok(previous)
    }

    /// Looks up a handle; stale or out-of-range handles yield `None`.
    /// 查詢代號；過期或超出範圍的代號回傳 `None`。
    pub fn get(&self, id: ItemId) -> Option<&T> {
        self.slots.get(id.slot()).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: ItemId) -> Option<&mut T> {
        self.slots.get_mut(id.slot()).and_then(Option::as_mut)
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.get(id).is_some()
    }

    /// Number of live entries.
    /// 存活項目的數量。
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Highest slot count ever reached.
    /// 曾經到達的最高槽位數。
    pub fn high_water_mark(&self) -> usize {
        self.slots.len()
    }

    /// Live entries in slot order. Each call starts a fresh walk.
    /// 依槽位順序列舉存活項目，每次呼叫都重新開始。
    pub fn iter(&self) -> impl Iterator<Item = (ItemId, &T)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|value| (ItemId(index as u32), value)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ItemId, &mut T)> + '_ {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_mut().map(|value| (ItemId(index as u32), value)))
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.live = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_returns_added_value_until_removed() {
        let mut table = HandleTable::new();
        let a = table.add("a");
        let b = table.add("b");
        assert_eq!(table.get(a), Some(&"a"));
        assert_eq!(table.get(b), Some(&"b"));
        assert_eq!(table.remove(a), Some("a"));
        assert_eq!(table.get(a), None);
        assert_eq!(table.get(b), Some(&"b"));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn freed_handle_is_reused_for_new_value() {
        let mut table = HandleTable::new();
        let first = table.add(1);
        let _second = table.add(2);
        table.remove(first);
        let third = table.add(3);
        assert_eq!(third, first);
        assert_eq!(table.get(third), Some(&3));
    }

    #[test]
    fn out_of_range_lookup_is_absent() {
        let table: HandleTable<u8> = HandleTable::new();
        assert_eq!(table.get(ItemId::from_raw(42)), None);
        assert_eq!(table.get(ItemId::NIL), None);
        assert_eq!(table.get(ItemId::ROOT), None);
    }

    #[test]
    fn replace_adopts_slot_without_new_handle() {
        let mut table = HandleTable::new();
        let a = table.add("a");
        table.remove(a);
        assert_eq!(table.replace(a, "moved"), Ok(None));
        assert_eq!(table.get(a), Some(&"moved"));
        let fresh = table.add("fresh");
        assert_ne!(fresh, a);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn replace_beyond_high_water_mark_grows_table() {
        let mut table = HandleTable::new();
        let far = ItemId::from_raw(3);
        table.replace(far, 'x').unwrap();
        assert_eq!(table.high_water_mark(), 4);
        let ids: Vec<_> = (0..3).map(|_| table.add('y')).collect();
        assert!(!ids.contains(&far));
        assert_eq!(table.len(), 4);
    }

    #[test]
    fn replace_rejects_sentinels() {
        let mut table = HandleTable::new();
        assert_eq!(
            table.replace(ItemId::ROOT, 0),
            Err(HandleTableError::Reserved(ItemId::ROOT))
        );
    }

    #[test]
    fn enumeration_skips_tombstones_and_restarts() {
        let mut table = HandleTable::new();
        let a = table.add('a');
        let b = table.add('b');
        let c = table.add('c');
        table.remove(b);
        let first: Vec<_> = table.iter().map(|(id, v)| (id, *v)).collect();
        let second: Vec<_> = table.iter().map(|(id, v)| (id, *v)).collect();
        assert_eq!(first, vec![(a, 'a'), (c, 'c')]);
        assert_eq!(first, second);
    }
}
