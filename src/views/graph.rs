use std::collections::{BTreeMap, BTreeSet};

/// Dependency graph between derived views, rebuilt from the current
/// definitions whenever it is needed so it can never drift from them.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// view -> relations it reads from
    sources: BTreeMap<String, Vec<String>>,
    /// relation -> views reading from it
    dependents: BTreeMap<String, Vec<String>>
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a view's sources.
    pub fn add_view(&mut self, view: &str, sources: &[String]) {
        self.sources.insert(view.to_string(), sources.to_vec());

        for source in sources {
            let dependents = self.dependents.entry(source.clone()).or_default();

            if !dependents.iter().any(|dependent| dependent == view) {
                dependents.push(view.to_string());
            }
        }
    }

    /// Views reading directly from `relation`.
    pub fn dependents(&self, relation: &str) -> &[String] {
        self.dependents.get(relation).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every view, each one after all the views it reads from.
    pub fn topological_order(&self) -> Vec<String> {
        let mut remaining: BTreeMap<&str, usize> = self.sources.iter()
            .map(|(view, sources)| {
                let upstream_views = sources.iter()
                    .filter(|source| self.sources.contains_key(*source))
                    .collect::<BTreeSet<_>>()
                    .len();
                (view.as_str(), upstream_views)
            })
            .collect();

        let mut ready: BTreeSet<&str> = remaining.iter()
            .filter(|(_, count)| **count == 0)
            .map(|(view, _)| *view)
            .collect();

        let mut order = Vec::with_capacity(self.sources.len());

        while let Some(view) = ready.pop_first() {
            remaining.remove(view);
            order.push(view.to_string());

            for dependent in self.dependents(view) {
                if let Some(count) = remaining.get_mut(dependent.as_str()) {
                    *count -= 1;

                    if *count == 0 {
                        ready.insert(dependent.as_str());
                    }
                }
            }
        }

        order
    }

    /// Views `view` reads from, directly or transitively, in topological order.
    pub fn upstream(&self, view: &str) -> Vec<String> {
        let mut visited = BTreeSet::new();
        self.collect_upstream(view, &mut visited);

        self.topological_order().into_iter()
            .filter(|candidate| visited.contains(candidate))
            .collect()
    }

    fn collect_upstream(&self, view: &str, visited: &mut BTreeSet<String>) {
        for source in self.sources.get(view).into_iter().flatten() {
            if self.sources.contains_key(source) && visited.insert(source.clone()) {
                self.collect_upstream(source, visited);
            }
        }
    }

    /// A chain of source edges leading from `from` to `to`, both included.
    pub fn path(&self, from: &str, to: &str) -> Option<Vec<String>> {
        let mut visited = BTreeSet::new();
        self.search(from, to, &mut visited)
    }

    fn search(&self, from: &str, to: &str, visited: &mut BTreeSet<String>) -> Option<Vec<String>> {
        if from == to {
            return Some(vec![from.to_string()]);
        }

        if !visited.insert(from.to_string()) {
            return None;
        }

        for source in self.sources.get(from).into_iter().flatten() {
            if let Some(mut path) = self.search(source, to, visited) {
                path.insert(0, from.to_string());
                return Some(path);
            }
        }

        None
    }
}
