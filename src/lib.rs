/*! slots_and_stages is the resource-binding and command-recording core of a
  cross-platform graphics abstraction.

It sits between an application that thinks in terms of resource sets and
command lists, and a native API that thinks in terms of per-stage register
slots, native views and command buffers.  The native side is reached through
the [`imp::Backend`] and [`imp::NativeRecorder`] traits; the core itself never
branches on which API is underneath, only on the [`imp::Capabilities`] the
backend reports.

# Concepts

| Concept                | Type                                   | Role                                                              |
|------------------------|----------------------------------------|-------------------------------------------------------------------|
| Resource layout        | [`ResourceLayout`]                     | Ordered schema of binding slots; assigns per-class device slots   |
| Resource set           | [`ResourceSet`]                        | Immutable objects matching a layout                               |
| View cache             | per [`Buffer`] / [`Texture`]           | Lazily created native views, at most one per key                  |
| Command list           | [`CommandList`]                        | Recording state machine with a shadow of bound state              |
| Staging pool           | per [`CommandList`]                    | Transfer buffers for updates that cannot be recorded directly     |
| Swapchain references   | [`Swapchain`]                          | Which command lists still target a swapchain                      |

# Binding hazards

Native APIs refuse (or silently drop) a resource bound for reading and for
writing at once.  The command list tracks where every buffer and texture is
bound and clears the opposite-polarity bind before making a new one.  The
resource set that owned the cleared bind is marked invalidated and is bound
again right before the next draw or dispatch.

# Lifecycle

```text
Initial -> Recording -> Ended -> Submitted -> Completed
```

See [`commands::lifecycle`] for the full transition table.

# Example

```
use std::sync::Arc;
use slots_and_stages::*;
use slots_and_stages::bindings::visible_to::{BufferUsage, ShaderStages, TextureUsage};
use slots_and_stages::imp::{Capabilities, soft::SoftBackend};
use slots_and_stages::pixel_formats::PixelFormat;

let device = Device::new(Arc::new(SoftBackend::new(Capabilities::deferred_context())), DeviceOptions::default());
let layout = ResourceLayout::new(vec![
    ResourceLayoutElement::new("camera", ResourceKind::UniformBuffer, ShaderStages::VERTEX),
]).unwrap();
let camera = device.create_buffer(BufferDescription::new(256, BufferUsage::UNIFORM_BUFFER, "camera")).unwrap();
let set = device.create_resource_set(&layout, vec![camera.into()], "frame").unwrap();
let pipeline = device.create_pipeline(PipelineDescription::graphics(vec![layout], vec![], "triangle")).unwrap();
let target = device.create_texture(TextureDescription::new_2d(64, 64, PixelFormat::RGBA8UNorm, TextureUsage::RENDER_TARGET, "target")).unwrap();
let framebuffer = device.create_framebuffer(vec![target], None).unwrap();

let mut list = device.create_command_list();
list.begin().unwrap();
list.set_framebuffer(&framebuffer).unwrap();
list.set_pipeline(&pipeline).unwrap();
list.set_resource_set(0, &set, &[]).unwrap();
list.draw(3, 1, 0, 0).unwrap();
list.end().unwrap();
device.submit(&mut list).unwrap();
device.wait_idle().unwrap();
assert_eq!(list.state(), CommandListState::Completed);
```
*/

pub mod bindings;
pub mod commands;
pub mod device;
pub mod error;
pub mod framebuffer;
pub mod imp;
pub mod pipeline;
pub mod pixel_formats;
pub mod resources;
pub mod swapchain;

pub use bindings::{
    BindableResource, BufferRange, ResourceKind, ResourceLayout, ResourceLayoutElement, ResourceSet, Sampler,
    SamplerDescription,
};
pub use commands::{CommandList, CommandListId, CommandListState, ScissorRect, Viewport};
pub use device::{Device, DeviceOptions};
pub use error::{Error, ErrorKind};
pub use framebuffer::Framebuffer;
pub use pipeline::{Pipeline, PipelineDescription, PipelineKind};
pub use resources::{Buffer, BufferDescription, ResourceId, Texture, TextureCopy, TextureDescription};
pub use swapchain::{Swapchain, SwapchainDescription};
