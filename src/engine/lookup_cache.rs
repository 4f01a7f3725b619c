// ==========================================
// 数据值导入系统 - 单次导入查找缓存
// ==========================================
// 职责: 按键记忆查找结果（含"未找到"），作用域为一次导入
// 红线: 同一键的底层查找最多执行一次；不跨导入共享
// ==========================================

use std::collections::HashMap;
use std::hash::Hash;

/// 缓存条目，未找到也显式记录
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEntry<V> {
    Found(V),
    NotFound,
}

impl<V> CacheEntry<V> {
    pub fn as_option(&self) -> Option<&V> {
        match self {
            CacheEntry::Found(v) => Some(v),
            CacheEntry::NotFound => None,
        }
    }
}

impl<V> From<Option<V>> for CacheEntry<V> {
    fn from(value: Option<V>) -> Self {
        match value {
            Some(v) => CacheEntry::Found(v),
            None => CacheEntry::NotFound,
        }
    }
}

// ==========================================
// LookupCache - 可能未命中的查找
// ==========================================
#[derive(Debug)]
pub struct LookupCache<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    loads: usize,
}

impl<K: Eq + Hash, V: Clone> LookupCache<K, V> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            loads: 0,
        }
    }

    /// 命中则直接返回；未命中时调用 loader 一次并记忆结果（包括 None）
    ///
    /// loader 出错时不记忆，错误原样返回
    pub fn get_or_try_load<E, F>(&mut self, key: K, loader: F) -> Result<Option<V>, E>
    where
        F: FnOnce() -> Result<Option<V>, E>,
    {
        if let Some(entry) = self.entries.get(&key) {
            return Ok(entry.as_option().cloned());
        }
        self.loads += 1;
        let loaded = loader()?;
        self.entries.insert(key, CacheEntry::from(loaded.clone()));
        Ok(loaded)
    }

    /// 预热: 直接写入已知存在的条目
    pub fn insert_found(&mut self, key: K, value: V) {
        self.entries.insert(key, CacheEntry::Found(value));
    }

    /// 底层查找次数
    pub fn loads(&self) -> usize {
        self.loads
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Eq + Hash, V: Clone> Default for LookupCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

// ==========================================
// PredicateCache - 总有结果的派生谓词
// ==========================================
// 用于: 允许周期类型 / 允许选项组合 / 组织机构分配 / 层级判定
#[derive(Debug)]
pub struct PredicateCache<K, V> {
    entries: HashMap<K, V>,
    loads: usize,
}

impl<K: Eq + Hash, V: Clone> PredicateCache<K, V> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            loads: 0,
        }
    }

    pub fn get_or_try_compute<E, F>(&mut self, key: K, supplier: F) -> Result<V, E>
    where
        F: FnOnce() -> Result<V, E>,
    {
        if let Some(v) = self.entries.get(&key) {
            return Ok(v.clone());
        }
        self.loads += 1;
        let v = supplier()?;
        self.entries.insert(key, v.clone());
        Ok(v)
    }

    pub fn loads(&self) -> usize {
        self.loads
    }
}

impl<K: Eq + Hash, V: Clone> Default for PredicateCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
