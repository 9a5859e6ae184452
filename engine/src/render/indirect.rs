//! Indirect Draw Commands
//!
//! GPU-resident draw descriptors consumed by `draw_indexed_indirect`. The
//! visibility kernel toggles `instance_count` between 0 (skip) and 1 (draw)
//! and leaves every other field untouched.

/// Indexed indirect draw command (matches wgpu `DrawIndexedIndirectArgs`).
///
/// Layout (20 bytes, tightly packed u32 fields):
/// - count:          u32 - Number of indices
/// - instance_count: u32 - Instances to draw (0 = culled)
/// - first_index:    u32 - First index in the index buffer
/// - base_vertex:    i32 - Added to each index before fetching vertices
/// - base_instance:  u32 - First instance id
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DrawElementsIndirectCommand {
    pub count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub base_vertex: i32,
    pub base_instance: u32,
}

const _: () = assert!(
    std::mem::size_of::<DrawElementsIndirectCommand>() == 20,
    "DrawElementsIndirectCommand must be 20 bytes to match the indirect args layout"
);

impl DrawElementsIndirectCommand {
    /// Create a single-instance draw.
    pub fn new(count: u32, first_index: u32, base_vertex: i32) -> Self {
        Self {
            count,
            instance_count: 1,
            first_index,
            base_vertex,
            base_instance: 0,
        }
    }

    /// Whether the command currently draws anything.
    #[inline]
    pub fn is_visible(&self) -> bool {
        self.instance_count != 0
    }

    /// Write the visibility decision into `instance_count`.
    #[inline]
    pub fn set_visible(&mut self, visible: bool) {
        self.instance_count = u32::from(visible);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_size() {
        assert_eq!(std::mem::size_of::<DrawElementsIndirectCommand>(), 20);
    }

    #[test]
    fn test_set_visible_only_touches_instance_count() {
        let mut cmd = DrawElementsIndirectCommand::new(36, 120, -4);
        cmd.base_instance = 7;
        cmd.set_visible(false);
        assert_eq!(cmd.instance_count, 0);
        assert!(!cmd.is_visible());
        cmd.set_visible(true);
        assert_eq!(
            cmd,
            DrawElementsIndirectCommand {
                count: 36,
                instance_count: 1,
                first_index: 120,
                base_vertex: -4,
                base_instance: 7,
            }
        );
    }
}
