// src/wgpu_utils/uniform_buffer.rs - Per-draw uniform blocks behind dynamic offsets
use std::marker::PhantomData;

/// Dynamic offsets must be multiples of this on every backend
pub const UNIFORM_OFFSET_ALIGNMENT: u64 = 256;

/// Uniform buffer holding one `Content` block per draw
///
/// Blocks are staged on the CPU while a frame is recorded and written in one
/// go by [`flush`](Self::flush). Each draw binds the buffer at the offset
/// returned by [`push`](Self::push).
pub struct DynamicUniformBuffer<Content> {
    buffer: wgpu::Buffer,
    capacity: u64,
    staged: Vec<u8>,
    content_type: PhantomData<Content>,
}

impl<Content: bytemuck::Pod> DynamicUniformBuffer<Content> {
    fn name() -> &'static str {
        let type_name = std::any::type_name::<Content>();
        let pos = type_name.rfind(':').unwrap_or(0);
        if pos > 0 {
            &type_name[(pos + 1)..]
        } else {
            type_name
        }
    }

    /// Distance in bytes between consecutive blocks
    pub fn stride() -> u64 {
        let size = std::mem::size_of::<Content>() as u64;
        size.div_ceil(UNIFORM_OFFSET_ALIGNMENT) * UNIFORM_OFFSET_ALIGNMENT
    }

    pub fn block_size() -> u64 {
        std::mem::size_of::<Content>() as u64
    }

    /// Creates a buffer with room for `capacity` blocks
    pub fn new(device: &wgpu::Device, capacity: u64) -> Self {
        let capacity = capacity.max(1);
        DynamicUniformBuffer {
            buffer: Self::allocate(device, capacity),
            capacity,
            staged: Vec::new(),
            content_type: PhantomData,
        }
    }

    fn allocate(device: &wgpu::Device, capacity: u64) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("DynamicUniformBuffer: {}", Self::name())),
            size: capacity * Self::stride(),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    /// Stages a block and returns its dynamic offset
    pub fn push(&mut self, content: &Content) -> u32 {
        let offset = self.staged.len();
        self.staged.extend_from_slice(bytemuck::bytes_of(content));
        self.staged.resize(offset + Self::stride() as usize, 0);
        offset as u32
    }

    pub fn staged_blocks(&self) -> u64 {
        self.staged.len() as u64 / Self::stride()
    }

    /// Uploads the staged blocks and starts over
    ///
    /// Returns `true` when the buffer had to grow, in which case bind groups
    /// referencing the old buffer must be recreated.
    pub fn flush(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) -> bool {
        let needed = self.staged_blocks();
        let grew = needed > self.capacity;
        if grew {
            self.capacity = needed.next_power_of_two();
            self.buffer = Self::allocate(device, self.capacity);
            log::debug!(
                "Grew {} uniform buffer to {} blocks",
                Self::name(),
                self.capacity
            );
        }
        if !self.staged.is_empty() {
            queue.write_buffer(&self.buffer, 0, &self.staged);
        }
        self.staged.clear();
        grew
    }

    /// Binding of a single block; the draw supplies the offset
    pub fn binding_resource(&self) -> wgpu::BindingResource {
        wgpu::BindingResource::Buffer(wgpu::BufferBinding {
            buffer: &self.buffer,
            offset: 0,
            size: wgpu::BufferSize::new(Self::block_size()),
        })
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }
}
