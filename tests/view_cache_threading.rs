// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
//! Command lists recording on several threads share the view caches of the
//! objects they bind.

use slots_and_stages::bindings::visible_to::{BufferUsage, ShaderStages, TextureUsage};
use slots_and_stages::imp::soft::{NativeCall, SoftBackend, SoftCommandBuffer};
use slots_and_stages::imp::{Capabilities, NativeView};
use slots_and_stages::pixel_formats::PixelFormat;
use slots_and_stages::*;
use std::collections::HashSet;
use std::sync::Arc;

#[cfg(target_arch = "wasm32")]
wasm_bindgen_test::wasm_bindgen_test_configure!(run_in_browser);

const THREADS: usize = 8;

fn shader_views(list: &CommandList) -> Vec<NativeView> {
    list.native_commands()
        .and_then(|commands| commands.downcast_ref::<SoftCommandBuffer>())
        .map(|commands| {
            commands
                .calls()
                .iter()
                .filter_map(|c| match c {
                    NativeCall::SetShaderResource { view: Some(view), .. } => Some(*view),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

#[test]
fn racing_lists_create_each_view_once() {
    let backend = Arc::new(SoftBackend::new(Capabilities::deferred_context()));
    let device = Device::new(backend.clone(), DeviceOptions::default());
    let particles = device
        .create_buffer(
            BufferDescription::new(512, BufferUsage::STRUCTURED_BUFFER_READ_ONLY, "particles").structured(16),
        )
        .unwrap();
    let sprite = device
        .create_texture(TextureDescription::new_2d(
            32,
            32,
            PixelFormat::RGBA8UNormSRGB,
            TextureUsage::SAMPLED,
            "sprite",
        ))
        .unwrap();
    let layout = ResourceLayout::new(vec![
        ResourceLayoutElement::new("particles", ResourceKind::StructuredBufferReadOnly, ShaderStages::VERTEX),
        ResourceLayoutElement::new("sprite", ResourceKind::TextureReadOnly, ShaderStages::FRAGMENT),
    ])
    .unwrap();
    let set = device
        .create_resource_set(&layout, vec![particles.clone().into(), sprite.clone().into()], "draw")
        .unwrap();
    let pipeline = device
        .create_pipeline(PipelineDescription::graphics(vec![layout], vec![], "sprites"))
        .unwrap();

    let recorded: Vec<Vec<NativeView>> = std::thread::scope(|scope| {
        let workers: Vec<_> = (0..THREADS)
            .map(|_| {
                scope.spawn(|| {
                    let mut list = device.create_command_list();
                    list.begin().unwrap();
                    list.set_pipeline(&pipeline).unwrap();
                    list.set_resource_set(0, &set, &[]).unwrap();
                    list.end().unwrap();
                    shader_views(&list)
                })
            })
            .collect();
        workers
            .into_iter()
            .map(|worker| worker.join().unwrap())
            .collect()
    });

    assert_eq!(particles.cached_view_count(), 1);
    assert_eq!(sprite.cached_view_count(), 1);
    assert_eq!(backend.stats().views_created, 2);
    let distinct: HashSet<Vec<NativeView>> = recorded.into_iter().collect();
    assert_eq!(distinct.len(), 1);
    assert_eq!(distinct.iter().next().map(Vec::len), Some(2));
}

#[test]
fn lists_record_and_complete_on_separate_threads() {
    let backend = Arc::new(SoftBackend::new(Capabilities::bindless_descriptor()));
    let device = Device::new(backend.clone(), DeviceOptions::default());
    let targets: Vec<Buffer> = (0..THREADS)
        .map(|i| {
            device
                .create_buffer(BufferDescription::new(16, BufferUsage::VERTEX_BUFFER, &format!("target{i}")))
                .unwrap()
        })
        .collect();

    std::thread::scope(|scope| {
        for (i, target) in targets.iter().enumerate() {
            let device = &device;
            scope.spawn(move || {
                let mut list = device.create_command_list();
                list.begin().unwrap();
                list.update_buffer(target, 0, &[i as u8; 16]).unwrap();
                list.end().unwrap();
                device.submit(&mut list).unwrap();
                device.wait_idle().unwrap();
                assert_eq!(list.state(), CommandListState::Completed);
                assert_eq!(list.available_staging_buffers().len(), 1);
            });
        }
    });

    assert_eq!(device.in_flight(), 0);
    assert_eq!(backend.stats().submissions, THREADS);
    for (i, target) in targets.iter().enumerate() {
        assert_eq!(device.read_buffer(target, 0, 16).unwrap(), vec![i as u8; 16]);
    }
}

#[test]
#[cfg_attr(target_arch = "wasm32", wasm_bindgen_test::wasm_bindgen_test)]
fn views_are_keyed_by_range_and_destroyed_with_their_buffer() {
    let backend = Arc::new(SoftBackend::new(Capabilities::immediate_device()));
    let device = Device::new(backend.clone(), DeviceOptions::default());
    let data = device
        .create_buffer(
            BufferDescription::new(
                256,
                BufferUsage::STRUCTURED_BUFFER_READ_ONLY | BufferUsage::STRUCTURED_BUFFER_READ_WRITE,
                "data",
            )
            .structured(16),
        )
        .unwrap();
    let layout = ResourceLayout::new(vec![ResourceLayoutElement::new(
        "data",
        ResourceKind::StructuredBufferReadOnly,
        ShaderStages::COMPUTE,
    )])
    .unwrap();
    let front = device
        .create_resource_set(&layout, vec![BufferRange::new(data.clone(), 0, 128).unwrap().into()], "front")
        .unwrap();
    let back = device
        .create_resource_set(&layout, vec![BufferRange::new(data.clone(), 128, 128).unwrap().into()], "back")
        .unwrap();
    let front_again = device
        .create_resource_set(&layout, vec![BufferRange::new(data.clone(), 0, 128).unwrap().into()], "front again")
        .unwrap();
    let pipeline = device
        .create_pipeline(PipelineDescription::compute(vec![layout], "reduce"))
        .unwrap();

    let mut list = device.create_command_list();
    list.begin().unwrap();
    list.set_pipeline(&pipeline).unwrap();
    for set in [&front, &back, &front_again] {
        list.set_resource_set(0, set, &[]).unwrap();
        list.dispatch(1, 1, 1).unwrap();
    }
    list.end().unwrap();
    assert_eq!(data.cached_view_count(), 2);
    assert_eq!(backend.stats().views, 2);

    drop((list, front, back, front_again, data));
    assert_eq!(backend.stats().views, 0);
    assert_eq!(backend.stats().buffers, 0);
}
