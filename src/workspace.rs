use std::any::Any;

/// Type-erased per-field scratch storage attached to a value cache.
///
/// Field kinds keep basis buffers, nested field caches or finders here. Entries survive
/// location changes and are only dropped together with the value cache that owns them.
#[derive(Debug, Default)]
pub struct Workspace {
    entries: Vec<Box<dyn Any + Send>>,
}

impl Workspace {
    pub fn get_or_insert_with<W, F>(&mut self, create: F) -> &mut W
    where
        W: Any + Send,
        F: FnOnce() -> W,
    {
        // Most recently used entry is kept last, so search from the back
        let idx = match self.entries.iter().rposition(|entry| entry.is::<W>()) {
            Some(idx) => idx,
            None => {
                self.entries.push(Box::new(create()));
                self.entries.len() - 1
            }
        };

        let last = self.entries.len() - 1;
        self.entries.swap(idx, last);
        match self.entries[last].downcast_mut() {
            Some(entry) => entry,
            None => unreachable!("entry was matched by type"),
        }
    }

    pub fn get_or_default<W>(&mut self) -> &mut W
    where
        W: Any + Send + Default,
    {
        self.get_or_insert_with(Default::default)
    }
}
