//! Compute buffer abstraction and the per-cluster buffer arena.
//!
//! Buffers hold f64 scratch data for solver workspaces. The arena owns a
//! set of fixed-shape buffers indexed by cluster id, allocated once when
//! the owning workspace is built and freed with it — there are no manual
//! paired allocate/dispose calls anywhere in the core.

/// A compute scratch buffer.
///
/// In the CPU reference backend this is simply a `Vec<f64>`; a device
/// backend would pair it with device-resident storage of the same shape.
#[derive(Debug, Clone)]
pub struct ComputeBuffer {
    data: Vec<f64>,
}

impl ComputeBuffer {
    /// Creates a new buffer filled with zeros.
    pub fn zeros(len: usize) -> Self {
        Self { data: vec![0.0; len] }
    }

    /// Returns the number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns a slice of the data.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Returns a mutable slice of the data.
    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Resets every element to zero.
    pub fn clear(&mut self) {
        self.data.fill(0.0);
    }
}

/// Fixed-shape buffers indexed by cluster id.
///
/// Shapes are declared up front; `get`/`get_mut` hand out the buffer for a
/// cluster. Dropping the arena drops every buffer.
#[derive(Debug, Default)]
pub struct BufferArena {
    buffers: Vec<ComputeBuffer>,
}

impl BufferArena {
    /// Creates an arena with one zeroed buffer per declared shape.
    /// `shapes[i]` is the element count for cluster id `i`.
    pub fn with_shapes(shapes: &[usize]) -> Self {
        Self {
            buffers: shapes.iter().map(|&n| ComputeBuffer::zeros(n)).collect(),
        }
    }

    /// Number of buffers in the arena.
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// Returns true if the arena holds no buffers.
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Borrow the buffer for a cluster id.
    pub fn get(&self, id: usize) -> &ComputeBuffer {
        &self.buffers[id]
    }

    /// Mutably borrow the buffer for a cluster id.
    pub fn get_mut(&mut self, id: usize) -> &mut ComputeBuffer {
        &mut self.buffers[id]
    }

    /// Zero every buffer in the arena.
    pub fn clear_all(&mut self) {
        for buf in &mut self.buffers {
            buf.clear();
        }
    }
}
