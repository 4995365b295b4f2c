use memory::layout::PGSIZE;
use memory::page::Frame;

struct FrameData {
    refcount: usize,
    bytes: Box<[u8; PGSIZE]>,
}

/// Physical memory: zero-filled frames shared by reference count.
///
/// Frame 0 is never handed out.
pub struct FrameTable {
    frames: Vec<Option<FrameData>>,
    free: Vec<usize>,
    limit: usize,
    allocated: usize,
}

impl FrameTable {
    pub fn new(limit: usize) -> Self {
        Self {
            frames: vec![None],
            free: Vec::new(),
            limit,
            allocated: 0,
        }
    }

    /// A fresh zeroed frame with no references, or `None` when memory is full.
    pub fn alloc(&mut self) -> Option<Frame> {
        if self.in_use() >= self.limit {
            return None;
        }
        let data = FrameData {
            refcount: 0,
            bytes: Box::new([0; PGSIZE]),
        };
        let index = match self.free.pop() {
            Some(index) => {
                self.frames[index] = Some(data);
                index
            }
            None => {
                self.frames.push(Some(data));
                self.frames.len() - 1
            }
        };
        self.allocated += 1;
        Some(Frame::from_index(index))
    }

    /// Give back a frame that never gained a reference.
    pub fn release_unused(&mut self, frame: Frame) {
        if self.refcount(frame) == 0 {
            self.free_frame(frame);
        }
    }

    pub fn incref(&mut self, frame: Frame) {
        if let Some(data) = self.get_mut(frame) {
            data.refcount += 1;
        }
    }

    /// Drop one reference, freeing the frame when none remain.
    pub fn decref(&mut self, frame: Frame) {
        let Some(data) = self.get_mut(frame) else {
            return;
        };
        debug_assert!(data.refcount > 0);
        data.refcount = data.refcount.saturating_sub(1);
        if data.refcount == 0 {
            self.free_frame(frame);
        }
    }

    pub fn refcount(&self, frame: Frame) -> usize {
        self.get(frame).map_or(0, |data| data.refcount)
    }

    pub fn bytes(&self, frame: Frame) -> Option<&[u8; PGSIZE]> {
        self.get(frame).map(|data| &*data.bytes)
    }

    pub fn bytes_mut(&mut self, frame: Frame) -> Option<&mut [u8; PGSIZE]> {
        self.get_mut(frame).map(|data| &mut *data.bytes)
    }

    pub fn in_use(&self) -> usize {
        self.frames.len() - 1 - self.free.len()
    }

    /// Frames handed out since the table was created.
    pub fn allocated(&self) -> usize {
        self.allocated
    }

    fn free_frame(&mut self, frame: Frame) {
        let index = frame.index();
        if let Some(slot) = self.frames.get_mut(index) {
            if slot.take().is_some() {
                self.free.push(index);
            }
        }
    }

    fn get(&self, frame: Frame) -> Option<&FrameData> {
        self.frames.get(frame.index()).and_then(Option::as_ref)
    }

    fn get_mut(&mut self, frame: Frame) -> Option<&mut FrameData> {
        self.frames.get_mut(frame.index()).and_then(Option::as_mut)
    }
}
