/// A collection that issues stable integer ids for its elements. Ids of
/// removed elements go on a free list and may be reissued; the profiler never
/// removes values, but front-ends that build functions incrementally do.
pub struct SparseCollection<T: SparseElement> {
    vector: Vec<Option<T>>,
    index_free_list: Vec<usize>,
}

pub trait SparseElement {
    type Id: Copy + Into<usize> + From<usize>;

    fn id(&self) -> Self::Id;
    fn set_id(&mut self, id: Self::Id);
}

impl<T: SparseElement> SparseCollection<T> {
    pub fn new() -> Self {
        Self {
            vector: Vec::new(),
            index_free_list: Vec::new(),
        }
    }

    pub fn add(&mut self, mut element: T) -> T::Id {
        let index = match self.index_free_list.pop() {
            Some(hole) => hole,
            None => {
                self.vector.push(None);
                self.vector.len() - 1
            }
        };

        let id: T::Id = index.into();
        element.set_id(id);
        self.vector[index] = Some(element);

        id
    }

    pub fn remove(&mut self, id: T::Id) -> Option<T> {
        let index = id.into();
        let element = self.vector.get_mut(index)?.take();

        if element.is_some() {
            self.index_free_list.push(index);
        }

        element
    }

    pub fn at(&self, id: T::Id) -> Option<&T> {
        let index = id.into();
        self.vector.get(index).and_then(|entry| entry.as_ref())
    }

    pub fn at_mut(&mut self, id: T::Id) -> Option<&mut T> {
        let index = id.into();
        self.vector.get_mut(index).and_then(|entry| entry.as_mut())
    }

    pub fn size(&self) -> usize {
        self.vector.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vector.iter().all(|entry| entry.is_none())
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.vector.iter().filter_map(|entry| entry.as_ref())
    }
}

impl<T: SparseElement> Default for SparseCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}
