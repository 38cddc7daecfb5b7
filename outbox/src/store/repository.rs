use std::marker::PhantomData;

use super::{Record, RecordStore};
use crate::types::error::{OutboxError, Result};

/// Id-keyed access to the records of one domain
///
/// Every mutation reloads the whole domain list, changes the matching
/// entries and writes the list back while holding the domain lock. When a
/// mutation closure fails nothing is written.
pub struct Repository<T: Record> {
    store: RecordStore,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            _record: PhantomData,
        }
    }
}

impl<T: Record> Repository<T> {
    pub fn new(store: RecordStore) -> Self {
        Self {
            store,
            _record: PhantomData,
        }
    }

    pub fn all(&self) -> Result<Vec<T>> {
        self.store.load(T::DOMAIN)
    }

    pub fn get(&self, id: &str) -> Result<Option<T>> {
        Ok(self.all()?.into_iter().find(|r| r.id() == id))
    }

    pub fn filter<P>(&self, predicate: P) -> Result<Vec<T>>
    where
        P: Fn(&T) -> bool,
    {
        Ok(self.all()?.into_iter().filter(|r| predicate(r)).collect())
    }

    pub fn insert(&self, record: T) -> Result<T> {
        let _guard = self.store.lock(T::DOMAIN);
        let mut records: Vec<T> = self.store.load(T::DOMAIN)?;

        if records.iter().any(|r| r.id() == record.id()) {
            return Err(OutboxError::InvalidState(format!(
                "{} record {} already exists",
                T::DOMAIN,
                record.id()
            )));
        }

        records.push(record.clone());
        self.store.save(T::DOMAIN, &records)?;
        Ok(record)
    }

    /// Mutate one record in place.
    ///
    /// Returns `Ok(None)` when no record has this id.
    pub fn update<F>(&self, id: &str, mutate: F) -> Result<Option<T>>
    where
        F: FnOnce(&mut T) -> Result<()>,
    {
        let _guard = self.store.lock(T::DOMAIN);
        let mut records: Vec<T> = self.store.load(T::DOMAIN)?;

        let Some(record) = records.iter_mut().find(|r| r.id() == id) else {
            return Ok(None);
        };

        mutate(record)?;
        let updated = record.clone();
        self.store.save(T::DOMAIN, &records)?;
        Ok(Some(updated))
    }

    /// Mutate every record for which `mutate` returns `true`.
    ///
    /// Writes back only when something changed; returns the changed records.
    pub fn update_many<F>(&self, mut mutate: F) -> Result<Vec<T>>
    where
        F: FnMut(&mut T) -> bool,
    {
        let _guard = self.store.lock(T::DOMAIN);
        let mut records: Vec<T> = self.store.load(T::DOMAIN)?;

        let mut changed = Vec::new();
        for record in records.iter_mut() {
            if mutate(record) {
                changed.push(record.clone());
            }
        }

        if !changed.is_empty() {
            self.store.save(T::DOMAIN, &records)?;
        }

        Ok(changed)
    }

    pub fn remove(&self, id: &str) -> Result<bool> {
        self.retain(|r| r.id() != id).map(|removed| removed > 0)
    }

    /// Keep only records matching `keep`; returns how many were dropped
    pub fn retain<P>(&self, keep: P) -> Result<usize>
    where
        P: Fn(&T) -> bool,
    {
        let _guard = self.store.lock(T::DOMAIN);
        let mut records: Vec<T> = self.store.load(T::DOMAIN)?;

        let before = records.len();
        records.retain(|r| keep(r));
        let removed = before - records.len();

        if removed > 0 {
            self.store.save(T::DOMAIN, &records)?;
        }

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Domain;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Item {
        id: String,
        count: u32,
    }

    impl Record for Item {
        const DOMAIN: Domain = Domain::OfflineEmails;

        fn id(&self) -> &str {
            &self.id
        }
    }

    fn item(id: &str) -> Item {
        Item {
            id: id.to_string(),
            count: 0,
        }
    }

    #[test]
    fn test_insert_rejects_duplicate_id() {
        let repo: Repository<Item> = Repository::new(RecordStore::in_memory());
        repo.insert(item("a")).unwrap();

        assert!(matches!(
            repo.insert(item("a")),
            Err(OutboxError::InvalidState(_))
        ));
        assert_eq!(repo.all().unwrap().len(), 1);
    }

    #[test]
    fn test_failed_mutation_writes_nothing() {
        let repo: Repository<Item> = Repository::new(RecordStore::in_memory());
        repo.insert(item("a")).unwrap();

        let result = repo.update("a", |r| {
            r.count = 99;
            Err(OutboxError::InvalidState("nope".to_string()))
        });

        assert!(result.is_err());
        assert_eq!(repo.get("a").unwrap().unwrap().count, 0);
    }

    #[test]
    fn test_update_unknown_id_is_none() {
        let repo: Repository<Item> = Repository::new(RecordStore::in_memory());
        assert_eq!(repo.update("missing", |_| Ok(())).unwrap(), None);
    }

    #[test]
    fn test_update_many_and_remove() {
        let repo: Repository<Item> = Repository::new(RecordStore::in_memory());
        for id in ["a", "b", "c"] {
            repo.insert(item(id)).unwrap();
        }

        let changed = repo
            .update_many(|r| {
                if r.id != "b" {
                    r.count += 1;
                    true
                } else {
                    false
                }
            })
            .unwrap();
        assert_eq!(changed.len(), 2);

        assert!(repo.remove("b").unwrap());
        assert!(!repo.remove("b").unwrap());
        assert_eq!(
            repo.all().unwrap().iter().map(|r| r.count).collect::<Vec<_>>(),
            vec![1, 1]
        );
    }
}
