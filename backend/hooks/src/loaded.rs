/// Already-defined classes, shared across loader threads.
///
/// Two threads racing to define the same class both transform it, but only
/// the first insert wins; the loser gets the winner's definition back.
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::error::Result;
use crate::transformer::ClassTransformer;

#[derive(Debug, PartialEq, Eq)]
pub struct LoadedClass {
    /// Internal class name.
    pub name: String,
    pub bytes: Arc<[u8]>,
    pub rewritten: bool,
}

#[derive(Debug, Default)]
pub struct LoadedClasses {
    classes: RwLock<HashMap<String, Arc<LoadedClass>>>,
}

impl LoadedClasses {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Arc<LoadedClass>> {
        self.classes.read().get(&name.replace('.', "/")).cloned()
    }

    /// Insert unless a definition already exists. Returns the stored
    /// definition and whether this call stored it.
    pub fn insert_if_absent(&self, class: LoadedClass) -> (Arc<LoadedClass>, bool) {
        let mut classes = self.classes.write();
        if let Some(existing) = classes.get(&class.name) {
            return (existing.clone(), false);
        }
        let class = Arc::new(class);
        classes.insert(class.name.clone(), class.clone());
        (class, true)
    }

    /// Define a class through `transformer`, reusing an existing definition.
    ///
    /// The transform runs without holding the map lock, so unrelated classes
    /// load in parallel.
    pub fn define(&self, name: &str, bytes: &[u8], transformer: &ClassTransformer) -> Result<Arc<LoadedClass>> {
        if let Some(existing) = self.get(name) {
            return Ok(existing);
        }
        let out = transformer.rewrite(bytes, name)?;
        let rewritten = &*out != bytes;
        let (class, inserted) = self.insert_if_absent(LoadedClass {
            name: name.replace('.', "/"),
            bytes: Arc::from(&*out),
            rewritten,
        });
        if !inserted {
            debug!(class = %class.name, "[LoadedClasses] Lost definition race");
        }
        Ok(class)
    }

    pub fn len(&self) -> usize {
        self.classes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn class(name: &str, byte: u8) -> LoadedClass {
        LoadedClass {
            name: name.into(),
            bytes: Arc::from(vec![byte]),
            rewritten: false,
        }
    }

    #[test]
    fn test_first_insert_wins() {
        let loaded = LoadedClasses::new();
        let (first, inserted) = loaded.insert_if_absent(class("a/B", 1));
        assert!(inserted);
        let (second, inserted) = loaded.insert_if_absent(class("a/B", 2));
        assert!(!inserted);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(&*second.bytes, &[1]);
    }

    #[test]
    fn test_concurrent_defines_agree() {
        let loaded = Arc::new(LoadedClasses::new());
        let transformer = Arc::new(ClassTransformer::default());
        let handles: Vec<_> = (0..8u8)
            .map(|i| {
                let loaded = loaded.clone();
                let transformer = transformer.clone();
                thread::spawn(move || loaded.define("a.B", &[i], &transformer).unwrap())
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(loaded.len(), 1);
        assert!(results.iter().all(|c| Arc::ptr_eq(c, &results[0])));
        assert!(loaded.get("a/B").is_some());
    }
}
