use crate::layer::{Layer, LayerContent, LayerId};

/// Ordered layer list plus the active selection. Index 0 paints first
/// (bottom of the stack); later indices paint over earlier ones.
///
/// Structural edits keep `active` valid or `None`; history/redraw are the
/// caller's responsibility.
#[derive(Clone, Debug, Default)]
pub struct LayerStore {
    layers: Vec<Layer>,
    active: Option<usize>,
    next_id: u64,
}

impl LayerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active
    }

    pub fn set_active(&mut self, index: usize) {
        if index < self.layers.len() {
            self.active = Some(index);
        }
    }

    pub fn active_layer(&self) -> Option<&Layer> {
        self.active.and_then(|i| self.layers.get(i))
    }

    pub fn active_layer_mut(&mut self) -> Option<&mut Layer> {
        match self.active {
            Some(i) => self.layers.get_mut(i),
            None => None,
        }
    }

    pub fn layer_mut(&mut self, index: usize) -> Option<&mut Layer> {
        self.layers.get_mut(index)
    }

    fn fresh_id(&mut self) -> LayerId {
        self.next_id += 1;
        LayerId(self.next_id)
    }

    /// Appends on top of the paint order and makes the new layer active.
    pub fn add(&mut self, name: impl Into<String>, content: LayerContent) -> LayerId {
        let id = self.fresh_id();
        self.layers.push(Layer::new(id, name, content));
        self.active = Some(self.layers.len() - 1);
        id
    }

    /// Deep copy inserted directly above the source; the copy becomes
    /// active. Pixel buffers are owned `Vec`s, so the clone never aliases.
    pub fn duplicate(&mut self, index: usize) -> Option<LayerId> {
        if index >= self.layers.len() {
            return None;
        }
        let mut copy = self.layers[index].clone();
        copy.id = self.fresh_id();
        copy.name = format!("{} copy", copy.name);
        let id = copy.id;
        self.layers.insert(index + 1, copy);
        self.active = Some(index + 1);
        Some(id)
    }

    /// Swap toward the top of the paint order; no-op at the top.
    pub fn move_up(&mut self, index: usize) -> bool {
        if index + 1 >= self.layers.len() {
            return false;
        }
        self.layers.swap(index, index + 1);
        self.active = Some(index + 1);
        true
    }

    /// Swap toward the bottom of the paint order; no-op at index 0.
    pub fn move_down(&mut self, index: usize) -> bool {
        if index == 0 || index >= self.layers.len() {
            return false;
        }
        self.layers.swap(index, index - 1);
        self.active = Some(index - 1);
        true
    }

    pub fn delete(&mut self, index: usize) -> bool {
        if index >= self.layers.len() {
            return false;
        }
        self.layers.remove(index);
        self.active = if self.layers.is_empty() {
            None
        } else {
            Some(self.active.unwrap_or(index).min(self.layers.len() - 1))
        };
        true
    }

    /// Remove-and-reinsert used by drag-to-reorder; the active selection
    /// follows the moved layer.
    pub fn reorder(&mut self, from: usize, to: usize) -> bool {
        if from >= self.layers.len() {
            return false;
        }
        let layer = self.layers.remove(from);
        let to = to.min(self.layers.len());
        self.layers.insert(to, layer);
        self.active = Some(to);
        true
    }

    /// Replace the whole list (snapshot restore). The active index is
    /// clamped; the id counter advances past every restored id.
    pub fn restore(&mut self, layers: Vec<Layer>) {
        let max_id = layers.iter().map(|l| l.id.0).max().unwrap_or(0);
        self.next_id = self.next_id.max(max_id);
        self.active = match self.active {
            _ if layers.is_empty() => None,
            Some(i) => Some(i.min(layers.len() - 1)),
            None => Some(layers.len() - 1),
        };
        self.layers = layers;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::ShapeSpec;

    fn store_abc() -> LayerStore {
        let mut s = LayerStore::new();
        s.add("A", LayerContent::Shape(ShapeSpec::default()));
        s.add("B", LayerContent::Shape(ShapeSpec::default()));
        s.add("C", LayerContent::Shape(ShapeSpec::default()));
        s
    }

    fn names(s: &LayerStore) -> Vec<&str> {
        s.layers().iter().map(|l| l.name.as_str()).collect()
    }

    #[test]
    fn add_appends_and_activates() {
        let s = store_abc();
        assert_eq!(names(&s), ["A", "B", "C"]);
        assert_eq!(s.active_index(), Some(2));
    }

    #[test]
    fn move_up_swaps_toward_top_and_follows() {
        let mut s = store_abc();
        assert!(s.move_up(0));
        assert_eq!(names(&s), ["B", "A", "C"]);
        assert_eq!(s.active_index(), Some(1));
        assert_eq!(s.active_layer().unwrap().name, "A");
    }

    #[test]
    fn move_boundaries_are_no_ops() {
        let mut s = store_abc();
        assert!(!s.move_down(0));
        assert!(!s.move_up(2));
        assert_eq!(names(&s), ["A", "B", "C"]);
    }

    #[test]
    fn duplicate_inserts_after_source() {
        let mut s = store_abc();
        let id = s.duplicate(1).unwrap();
        assert_eq!(names(&s), ["A", "B", "B copy", "C"]);
        assert_eq!(s.active_index(), Some(2));
        assert_eq!(s.active_layer().unwrap().id, id);
    }

    #[test]
    fn delete_clamps_active() {
        let mut s = store_abc();
        s.set_active(2);
        assert!(s.delete(2));
        assert_eq!(s.active_index(), Some(1));
        s.delete(0);
        s.delete(0);
        assert_eq!(s.active_index(), None);
        assert!(!s.delete(0));
    }

    #[test]
    fn reorder_moves_and_tracks() {
        let mut s = store_abc();
        assert!(s.reorder(0, 2));
        assert_eq!(names(&s), ["B", "C", "A"]);
        assert_eq!(s.active_layer().unwrap().name, "A");
    }

    #[test]
    fn duplicate_ids_are_unique() {
        let mut s = store_abc();
        let id = s.duplicate(0).unwrap();
        let ids: Vec<_> = s.layers().iter().map(|l| l.id).collect();
        assert_eq!(ids.iter().filter(|&&i| i == id).count(), 1);
    }
}
