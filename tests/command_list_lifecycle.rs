// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Command list state machine, draw preconditions, debug markers,
//! indirect fallbacks, allocation failures and swapchain references.

use slots_and_stages::bindings::visible_to::{BufferUsage, ShaderStages, TextureUsage};
use slots_and_stages::imp::soft::{NativeCall, SoftBackend, SoftCommandBuffer};
use slots_and_stages::imp::Capabilities;
use slots_and_stages::pixel_formats::{IndexFormat, PixelFormat};
use slots_and_stages::*;
use std::sync::Arc;

#[cfg(target_arch = "wasm32")]
wasm_bindgen_test::wasm_bindgen_test_configure!(run_in_browser);

struct Fixture {
    backend: Arc<SoftBackend>,
    device: Device,
    framebuffer: Framebuffer,
    layout: ResourceLayout,
    set: ResourceSet,
    pipeline: Pipeline,
}

fn fixture_with(capabilities: Capabilities, options: DeviceOptions) -> Fixture {
    let backend = Arc::new(SoftBackend::new(capabilities));
    let device = Device::new(backend.clone(), options);
    let target = device
        .create_texture(TextureDescription::new_2d(
            32,
            32,
            PixelFormat::BGRA8UNorm,
            TextureUsage::RENDER_TARGET,
            "target",
        ))
        .unwrap();
    let framebuffer = device.create_framebuffer(vec![target], None).unwrap();
    let layout = ResourceLayout::new(vec![ResourceLayoutElement::new(
        "globals",
        ResourceKind::UniformBuffer,
        ShaderStages::VERTEX | ShaderStages::FRAGMENT,
    )])
    .unwrap();
    let globals = device
        .create_buffer(BufferDescription::new(256, BufferUsage::UNIFORM_BUFFER, "globals"))
        .unwrap();
    let set = device
        .create_resource_set(&layout, vec![globals.into()], "globals")
        .unwrap();
    let pipeline = device
        .create_pipeline(PipelineDescription::graphics(vec![layout.clone()], vec![16], "triangle"))
        .unwrap();
    Fixture {
        backend,
        device,
        framebuffer,
        layout,
        set,
        pipeline,
    }
}

fn fixture() -> Fixture {
    fixture_with(Capabilities::deferred_context(), DeviceOptions::default())
}

fn calls(list: &CommandList) -> Vec<NativeCall> {
    list.native_commands()
        .and_then(|commands| commands.downcast_ref::<SoftCommandBuffer>())
        .map(|commands| commands.calls().to_vec())
        .unwrap_or_default()
}

fn record_triangle(f: &Fixture, list: &mut CommandList) {
    list.begin().unwrap();
    list.set_framebuffer(&f.framebuffer).unwrap();
    list.set_pipeline(&f.pipeline).unwrap();
    list.set_resource_set(0, &f.set, &[]).unwrap();
    list.draw(3, 1, 0, 0).unwrap();
    list.end().unwrap();
}

#[test]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn recording_produces_a_finalized_buffer_and_forgets_state() {
    let f = fixture();
    let mut list = f.device.create_command_list();
    assert_eq!(list.state(), CommandListState::Initial);
    record_triangle(&f, &mut list);
    assert_eq!(list.state(), CommandListState::Ended);

    let recorded = calls(&list);
    assert!(recorded.contains(&NativeCall::Draw {
        vertex_count: 3,
        instance_count: 1,
        first_vertex: 0,
        first_instance: 0,
    }));
    let draw_at = recorded
        .iter()
        .position(|c| matches!(c, NativeCall::Draw { .. }))
        .unwrap();
    let viewport_at = recorded
        .iter()
        .position(|c| matches!(c, NativeCall::SetViewports(_)))
        .unwrap();
    assert!(viewport_at < draw_at);

    list.begin().unwrap();
    assert!(list.bound_pipeline().is_none());
    assert!(list.bound_framebuffer().is_none());
    assert!(list.bound_resource_set(PipelineKind::Graphics, 0).is_none());
    assert!(list.native_commands().is_none());
}

#[test]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn draws_record_without_a_framebuffer() {
    let f = fixture();
    let mut list = f.device.create_command_list();
    list.begin().unwrap();
    list.set_pipeline(&f.pipeline).unwrap();
    list.set_resource_set(0, &f.set, &[]).unwrap();
    list.draw(3, 1, 0, 0).unwrap();
    list.end().unwrap();
    assert_eq!(list.state(), CommandListState::Ended);

    let recorded = calls(&list);
    assert!(recorded.contains(&NativeCall::Draw {
        vertex_count: 3,
        instance_count: 1,
        first_vertex: 0,
        first_instance: 0,
    }));
    assert!(!recorded.iter().any(|c| matches!(c, NativeCall::SetFramebuffer(_))));

    f.device.submit(&mut list).unwrap();
    f.device.wait_idle().unwrap();
    assert_eq!(list.state(), CommandListState::Completed);
}

#[test]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn illegal_transitions_are_invalid_state() {
    let f = fixture();
    let mut list = f.device.create_command_list();

    let err = list.end().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert_eq!(list.state(), CommandListState::Initial);

    list.begin().unwrap();
    assert_eq!(list.begin().unwrap_err().kind(), ErrorKind::InvalidState);
    list.end().unwrap();
    assert_eq!(list.end().unwrap_err().kind(), ErrorKind::InvalidState);
    assert_eq!(
        list.draw(3, 1, 0, 0).unwrap_err().kind(),
        ErrorKind::InvalidState
    );

    f.device.submit(&mut list).unwrap();
    assert_eq!(list.state(), CommandListState::Submitted);
    assert_eq!(list.begin().unwrap_err().kind(), ErrorKind::InvalidState);
    assert_eq!(list.reset().unwrap_err().kind(), ErrorKind::InvalidState);
    assert_eq!(f.device.submit(&mut list).unwrap_err().kind(), ErrorKind::InvalidState);

    assert_eq!(f.device.poll().unwrap(), 1);
    assert_eq!(list.state(), CommandListState::Completed);
    list.reset().unwrap();
    assert_eq!(list.state(), CommandListState::Initial);
}

#[test]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn begin_from_ended_discards_the_recording() {
    let f = fixture();
    let mut list = f.device.create_command_list();
    record_triangle(&f, &mut list);
    assert!(list.native_commands().is_some());
    list.begin().unwrap();
    assert!(list.native_commands().is_none());
    list.end().unwrap();
    assert!(calls(&list).is_empty());
}

#[test]
fn completion_future_resolves_after_poll() {
    let f = fixture();
    let mut list = f.device.create_command_list();
    assert!(test_executors::sleep_on(list.completion()).is_err());
    record_triangle(&f, &mut list);
    f.device.submit(&mut list).unwrap();
    let completion = list.completion();
    let device = f.device.clone();
    let poller = std::thread::spawn(move || device.wait_idle());
    test_executors::sleep_on(completion).unwrap();
    poller.join().unwrap().unwrap();
    assert_eq!(list.state(), CommandListState::Completed);
    assert_eq!(f.device.in_flight(), 0);
}

#[test]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn draws_check_their_preconditions() {
    let f = fixture();
    let mut list = f.device.create_command_list();
    list.begin().unwrap();
    list.set_framebuffer(&f.framebuffer).unwrap();

    let err = list.draw(3, 1, 0, 0).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    list.set_pipeline(&f.pipeline).unwrap();
    let err = list.draw(3, 1, 0, 0).unwrap_err();
    assert!(err.to_string().contains("slot 0"), "{err}");

    list.set_resource_set(0, &f.set, &[]).unwrap();
    let err = list.draw_indexed(3, 1, 0, 0, 0).unwrap_err();
    assert!(err.to_string().contains("index buffer"), "{err}");

    let err = list.dispatch(1, 1, 1).unwrap_err();
    assert!(err.to_string().contains("compute pipeline"), "{err}");

    let err = list.set_resource_set(1, &f.set, &[]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    let indices = f
        .device
        .create_buffer(BufferDescription::new(64, BufferUsage::INDEX_BUFFER, "indices"))
        .unwrap();
    let err = list.set_index_buffer(&indices, IndexFormat::U32, 2).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    list.set_index_buffer(&indices, IndexFormat::U16, 0)
        .unwrap();
    list.set_index_buffer(&indices, IndexFormat::U16, 0)
        .unwrap();
    list.draw_indexed(3, 1, 0, 0, 0).unwrap();
    list.end().unwrap();

    let index_binds = calls(&list)
        .iter()
        .filter(|c| matches!(c, NativeCall::SetIndexBuffer { .. }))
        .count();
    assert_eq!(index_binds, 1);
}

#[test]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn set_resource_set_needs_a_pipeline() {
    let f = fixture();
    let mut list = f.device.create_command_list();
    assert_eq!(
        list.set_resource_set(0, &f.set, &[]).unwrap_err().kind(),
        ErrorKind::InvalidState
    );
    list.begin().unwrap();
    let err = list.set_resource_set(0, &f.set, &[]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    let err = list.set_compute_resource_set(0, &f.set, &[]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[test]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn debug_groups_are_balanced_and_optional() {
    let enabled = DeviceOptions {
        emit_debug_markers: true,
        ..DeviceOptions::default()
    };
    let f = fixture_with(Capabilities::deferred_context(), enabled);
    let mut list = f.device.create_command_list();
    list.begin().unwrap();
    assert_eq!(list.pop_debug_group().unwrap_err().kind(), ErrorKind::InvalidState);
    list.push_debug_group("frame").unwrap();
    list.insert_debug_marker("here").unwrap();
    list.pop_debug_group().unwrap();
    list.push_debug_group("left open").unwrap();
    list.end().unwrap();
    assert_eq!(
        calls(&list),
        vec![
            NativeCall::PushDebugGroup("frame".to_string()),
            NativeCall::InsertDebugMarker("here".to_string()),
            NativeCall::PopDebugGroup,
            NativeCall::PushDebugGroup("left open".to_string()),
            NativeCall::PopDebugGroup,
        ]
    );

    // no marker support: skipped, but still balanced
    let f = fixture_with(Capabilities::immediate_device(), enabled);
    let mut list = f.device.create_command_list();
    list.begin().unwrap();
    list.push_debug_group("frame").unwrap();
    list.insert_debug_marker("here").unwrap();
    list.pop_debug_group().unwrap();
    assert!(list.pop_debug_group().is_err());
    list.end().unwrap();
    assert!(calls(&list).is_empty());

    // markers off by option
    let f = fixture_with(Capabilities::deferred_context(), DeviceOptions::default());
    let mut list = f.device.create_command_list();
    list.begin().unwrap();
    list.push_debug_group("frame").unwrap();
    list.pop_debug_group().unwrap();
    list.end().unwrap();
    assert!(calls(&list).is_empty());
}

#[test]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn indirect_draws_fall_back_to_one_call_per_record() {
    for (capabilities, expected) in [
        (Capabilities::deferred_context(), vec![(0, 1), (32, 1), (64, 1)]),
        (Capabilities::immediate_device(), vec![(0, 3)]),
    ] {
        let f = fixture_with(capabilities, DeviceOptions::default());
        let arguments = f
            .device
            .create_buffer(BufferDescription::new(128, BufferUsage::INDIRECT_BUFFER, "args"))
            .unwrap();
        let mut list = f.device.create_command_list();
        list.begin().unwrap();
        list.set_framebuffer(&f.framebuffer).unwrap();
        list.set_pipeline(&f.pipeline).unwrap();
        list.set_resource_set(0, &f.set, &[]).unwrap();
        list.draw_indirect(&arguments, 0, 3, 32).unwrap();
        list.end().unwrap();

        let issued: Vec<(u64, u32)> = calls(&list)
            .into_iter()
            .filter_map(|c| match c {
                NativeCall::DrawIndirect {
                    offset, draw_count, ..
                } => Some((offset, draw_count)),
                _ => None,
            })
            .collect();
        assert_eq!(issued, expected);
    }
}

#[test]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn indirect_arguments_must_fit() {
    let f = fixture();
    let arguments = f
        .device
        .create_buffer(BufferDescription::new(32, BufferUsage::INDIRECT_BUFFER, "args"))
        .unwrap();
    let plain = f
        .device
        .create_buffer(BufferDescription::new(32, BufferUsage::VERTEX_BUFFER, "plain"))
        .unwrap();
    let mut list = f.device.create_command_list();
    list.begin().unwrap();
    list.set_framebuffer(&f.framebuffer).unwrap();
    list.set_pipeline(&f.pipeline).unwrap();
    list.set_resource_set(0, &f.set, &[]).unwrap();
    assert!(list.draw_indirect(&arguments, 0, 3, 16).is_err());
    assert!(list.draw_indirect(&plain, 0, 1, 16).is_err());
    list.draw_indirect(&arguments, 16, 1, 16).unwrap();
}

#[test]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn allocation_failure_leaves_the_list_usable() {
    let f = fixture();
    let mut list = f.device.create_command_list();

    f.backend.fail_next_allocations(1);
    let err = list.begin().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AllocationFailure);
    assert!(err.is_recoverable());
    assert_eq!(list.state(), CommandListState::Initial);

    let texture_layout = ResourceLayout::new(vec![ResourceLayoutElement::new(
        "albedo",
        ResourceKind::TextureReadOnly,
        ShaderStages::FRAGMENT,
    )])
    .unwrap();
    let albedo = f
        .device
        .create_texture(TextureDescription::new_2d(
            8,
            8,
            PixelFormat::RGBA8UNorm,
            TextureUsage::SAMPLED,
            "albedo",
        ))
        .unwrap();
    let textured = f
        .device
        .create_resource_set(&texture_layout, vec![albedo.clone().into()], "textured")
        .unwrap();
    let pipeline = f
        .device
        .create_pipeline(PipelineDescription::graphics(
            vec![f.layout.clone(), texture_layout],
            vec![],
            "textured",
        ))
        .unwrap();

    list.begin().unwrap();
    list.set_framebuffer(&f.framebuffer).unwrap();
    list.set_pipeline(&pipeline).unwrap();
    list.set_resource_set(0, &f.set, &[]).unwrap();
    f.backend.fail_next_allocations(1);
    let err = list.set_resource_set(1, &textured, &[]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AllocationFailure);
    assert_eq!(list.state(), CommandListState::Recording);
    assert_eq!(albedo.cached_view_count(), 0);

    // the next draw retries the activation
    list.draw(3, 1, 0, 0).unwrap();
    assert_eq!(albedo.cached_view_count(), 1);
    list.end().unwrap();
    f.device.submit(&mut list).unwrap();
    f.device.wait_idle().unwrap();
    assert_eq!(list.state(), CommandListState::Completed);
}

#[test]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn swapchain_is_referenced_until_completion() {
    let f = fixture();
    let mut swapchain = f
        .device
        .create_swapchain(SwapchainDescription::new(64, 48, PixelFormat::BGRA8UNormSRGB, "window"))
        .unwrap();
    let mut list = f.device.create_command_list();
    list.begin().unwrap();
    list.set_framebuffer(swapchain.framebuffer()).unwrap();
    list.clear_color_target(0, [0.0, 0.0, 0.0, 1.0]).unwrap();
    assert_eq!(
        list.clear_depth_stencil(1.0, 0).unwrap_err().kind(),
        ErrorKind::InvalidState
    );
    assert!(list.clear_color_target(1, [0.0; 4]).is_err());
    list.end().unwrap();
    assert!(swapchain.is_referenced());
    assert_eq!(swapchain.resize(128, 96).unwrap_err().kind(), ErrorKind::InvalidState);

    f.device.submit(&mut list).unwrap();
    assert!(swapchain.is_referenced());
    f.device.wait_idle().unwrap();
    assert!(!swapchain.is_referenced());
    swapchain.resize(128, 96).unwrap();
    assert_eq!(swapchain.framebuffer().width(), 128);

    // a discarded recording drops its reference as well
    list.begin().unwrap();
    list.set_framebuffer(swapchain.framebuffer()).unwrap();
    assert_eq!(swapchain.reference_count(), 1);
    list.reset().unwrap();
    assert_eq!(swapchain.reference_count(), 0);
}

#[test]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn viewports_are_coalesced_until_draw() {
    let f = fixture();
    let mut list = f.device.create_command_list();
    list.begin().unwrap();
    list.set_framebuffer(&f.framebuffer).unwrap();
    list.set_pipeline(&f.pipeline).unwrap();
    list.set_resource_set(0, &f.set, &[]).unwrap();
    list.set_viewport(0, Viewport::new(0.0, 0.0, 8.0, 8.0)).unwrap();
    list.set_viewport(1, Viewport::new(8.0, 0.0, 8.0, 8.0)).unwrap();
    list.set_full_scissor_rects().unwrap();
    list.draw(3, 1, 0, 0).unwrap();
    list.draw(3, 1, 0, 0).unwrap();
    list.end().unwrap();

    let viewports: Vec<Vec<Viewport>> = calls(&list)
        .into_iter()
        .filter_map(|c| match c {
            NativeCall::SetViewports(v) => Some(v),
            _ => None,
        })
        .collect();
    assert_eq!(
        viewports,
        vec![vec![
            Viewport::new(0.0, 0.0, 8.0, 8.0),
            Viewport::new(8.0, 0.0, 8.0, 8.0)
        ]]
    );
}

#[test]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn copies_are_bounds_checked() {
    let f = fixture();
    let a = f
        .device
        .create_buffer(BufferDescription::new(16, BufferUsage::VERTEX_BUFFER, "a"))
        .unwrap();
    let b = f
        .device
        .create_buffer(BufferDescription::new(16, BufferUsage::VERTEX_BUFFER, "b"))
        .unwrap();
    let mut list = f.device.create_command_list();
    list.begin().unwrap();
    list.copy_buffer(&a, 0, &b, 8, 8).unwrap();
    assert!(list.copy_buffer(&a, 0, &b, 9, 8).is_err());
    assert!(list.copy_buffer(&a, 0, &a, 4, 8).is_err());

    let small = f
        .device
        .create_texture(TextureDescription::new_2d(4, 4, PixelFormat::R8UNorm, TextureUsage::SAMPLED, "small"))
        .unwrap();
    let large = f
        .device
        .create_texture(
            TextureDescription::new_2d(8, 8, PixelFormat::R8UNorm, TextureUsage::SAMPLED, "large").with_mip_levels(2),
        )
        .unwrap();
    list.copy_texture(&small, &large, &TextureCopy::whole((4, 4, 1)))
        .unwrap();
    let mut region = TextureCopy::whole((4, 4, 1));
    region.destination_mip_level = 1;
    list.copy_texture(&small, &large, &region).unwrap();
    region.destination_origin = (1, 0, 0);
    assert!(list.copy_texture(&small, &large, &region).is_err());
    assert!(list.copy_texture(&large, &small, &TextureCopy::whole((8, 8, 1))).is_err());
    assert!(list.generate_mipmaps(&large).is_err());
    list.end().unwrap();
    assert_eq!(
        calls(&list)
            .iter()
            .filter(|c| matches!(c, NativeCall::CopyTexture { .. }))
            .count(),
        2
    );
}

#[test]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn mip_levels_beyond_the_chain_are_rejected() {
    let f = fixture();
    let err = f
        .device
        .create_texture(
            TextureDescription::new_2d(8, 8, PixelFormat::R8UNorm, TextureUsage::SAMPLED, "too deep").with_mip_levels(40),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert_eq!(f.backend.stats().textures, 1);

    let chain = |name: &str| {
        f.device
            .create_texture(
                TextureDescription::new_2d(8, 8, PixelFormat::R8UNorm, TextureUsage::SAMPLED, name).with_mip_levels(4),
            )
            .unwrap()
    };
    let (source, destination) = (chain("source"), chain("destination"));
    let mut list = f.device.create_command_list();
    list.begin().unwrap();
    let mut region = TextureCopy::whole((1, 1, 1));
    region.source_mip_level = 3;
    region.destination_mip_level = 3;
    list.copy_texture(&source, &destination, &region).unwrap();
    region.source_mip_level = 33;
    region.destination_mip_level = 0;
    let err = list.copy_texture(&source, &destination, &region).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    list.end().unwrap();
}

#[test]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn depth_clears_resolves_and_explicit_graphics_sets() {
    let f = fixture();
    let swapchain = f
        .device
        .create_swapchain(
            SwapchainDescription::new(16, 16, PixelFormat::RGBA8UNorm, "window").with_depth(PixelFormat::Depth32Float),
        )
        .unwrap();
    let multisampled = f
        .device
        .create_texture(
            TextureDescription::new_2d(16, 16, PixelFormat::RGBA8UNorm, TextureUsage::RENDER_TARGET, "msaa")
                .with_sample_count(4),
        )
        .unwrap();
    let resolved = f
        .device
        .create_texture(TextureDescription::new_2d(16, 16, PixelFormat::RGBA8UNorm, TextureUsage::SAMPLED, "resolved"))
        .unwrap();
    let compute = f
        .device
        .create_pipeline(PipelineDescription::compute(vec![f.layout.clone()], "compute"))
        .unwrap();

    let mut list = f.device.create_command_list();
    list.begin().unwrap();
    list.set_framebuffer(swapchain.framebuffer()).unwrap();
    list.clear_depth_stencil(1.0, 0).unwrap();
    list.resolve_texture(&multisampled, &resolved).unwrap();
    assert!(list.resolve_texture(&resolved, &multisampled).is_err());

    list.set_pipeline(&f.pipeline).unwrap();
    list.set_pipeline(&compute).unwrap();
    list.set_graphics_resource_set(0, &f.set, &[]).unwrap();
    assert!(list.bound_resource_set(PipelineKind::Graphics, 0).is_some());
    assert!(list.bound_resource_set(PipelineKind::Compute, 0).is_none());
    list.draw(3, 1, 0, 0).unwrap();
    list.end().unwrap();

    let recorded = calls(&list);
    assert!(recorded.contains(&NativeCall::ClearDepthStencil { depth: 1.0, stencil: 0 }));
    assert!(recorded.contains(&NativeCall::ResolveTexture {
        source: multisampled.native(),
        destination: resolved.native(),
    }));
}
