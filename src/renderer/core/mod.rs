/// "Core" refers to the Vulkan objects every other part of the renderer is created from.

pub mod context;
