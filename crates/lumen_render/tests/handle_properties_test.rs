//! Property tests: arbitrary add/remove sequences against the buffer pool.

use std::collections::HashSet;

use lumen_render::backend::headless::HeadlessBackend;
use lumen_render::{
    BufferDesc, BufferId, BufferType, DeviceRequirements, PoolCapacities, RenderError, Renderer,
    RendererConfig, ResourceKind,
};
use proptest::prelude::*;

const CAPACITY: u32 = 8;

fn renderer() -> Renderer<HeadlessBackend> {
    let backend = HeadlessBackend::new(&DeviceRequirements::default()).unwrap();
    let config = RendererConfig {
        staging_buffer_size: 64 * 1024,
        pools: PoolCapacities { buffers: CAPACITY, ..PoolCapacities::default() },
        ..RendererConfig::default()
    };
    Renderer::new(backend, config).unwrap()
}

#[derive(Clone, Debug)]
enum Step {
    Add(u64),
    Remove(usize),
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (1u64..16).prop_map(|words| Step::Add(words * 4)),
        any::<usize>().prop_map(Step::Remove),
    ]
}

proptest! {
    #[test]
    fn prop_live_buffers_never_share_a_handle(steps in prop::collection::vec(step(), 1..64)) {
        let mut renderer = renderer();
        let mut live: Vec<BufferId> = Vec::new();
        let mut retired: Vec<BufferId> = Vec::new();

        for step in steps {
            match step {
                Step::Add(size) => {
                    let mut slot = None;
                    let result = renderer.add_buffer(&BufferDesc::bytes(BufferType::Storage, size), &mut slot, None);
                    if live.len() == CAPACITY as usize {
                        prop_assert!(matches!(result, Err(RenderError::Memory(_))));
                        prop_assert!(slot.is_none());
                    } else {
                        prop_assert!(result.is_ok());
                        let id = slot.unwrap();
                        prop_assert!(!live.contains(&id));
                        live.push(id);
                    }
                }
                Step::Remove(pick) if !live.is_empty() => {
                    let mut slot = Some(live.swap_remove(pick % live.len()));
                    let id = slot.unwrap();
                    prop_assert!(renderer.remove_buffer(&mut slot).is_ok());
                    prop_assert!(slot.is_none());
                    retired.push(id);
                }
                Step::Remove(_) => {}
            }

            prop_assert_eq!(renderer.live_count(ResourceKind::Buffer), live.len());
            prop_assert_eq!(renderer.free_count(ResourceKind::Buffer), CAPACITY as usize - live.len());
        }

        let indices: HashSet<u32> = live.iter().map(|id| id.handle().index()).collect();
        prop_assert_eq!(indices.len(), live.len());
        for id in &retired {
            prop_assert!(renderer.buffer(*id).is_err());
        }

        for id in live {
            renderer.remove_buffer(&mut Some(id)).unwrap();
        }
        prop_assert!(renderer.destroy().is_ok());
    }
}
