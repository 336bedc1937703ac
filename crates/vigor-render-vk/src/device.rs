// SPDX-License-Identifier: CEPL-1.0
use std::borrow::Cow;
use std::ffi::{c_char, c_void, CStr};
use std::rc::Rc;
use std::sync::Arc;

use ash::{
    ext::debug_utils,
    khr::{surface, swapchain},
    vk, Entry,
};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use tracing::{debug, info, warn};
use vigor_core::{DiagnosticSink, Severity};

use crate::error::{Result, VkError, VkResultExt};
use crate::surface::{PresentSurface, SurfaceSupport};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";
const ENGINE_NAME: &CStr = c"Vigor";

/// Queue family indices for one physical device.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
    pub compute: Option<u32>,
}

impl QueueFamilyIndices {
    /// First graphics and first compute family win. Presentation prefers the
    /// graphics family when it can present, else the first family that can.
    pub fn resolve(
        families: &[vk::QueueFamilyProperties],
        mut can_present: impl FnMut(u32) -> bool,
    ) -> Self {
        let mut out = Self::default();
        for (i, family) in families.iter().enumerate() {
            if family.queue_count == 0 {
                continue;
            }
            let i = i as u32;
            if out.graphics.is_none() && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
                out.graphics = Some(i);
            }
            if out.compute.is_none() && family.queue_flags.contains(vk::QueueFlags::COMPUTE) {
                out.compute = Some(i);
            }
        }
        out.present = match out.graphics {
            Some(g) if can_present(g) => Some(g),
            _ => (0..families.len() as u32)
                .filter(|&i| families[i as usize].queue_count > 0)
                .find(|&i| can_present(i)),
        };
        out
    }

    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some() && self.compute.is_some()
    }

    pub fn unique(&self) -> Vec<u32> {
        let mut v: Vec<u32> = [self.graphics, self.present, self.compute]
            .into_iter()
            .flatten()
            .collect();
        v.sort_unstable();
        v.dedup();
        v
    }
}

/// Snapshot of what a physical device offers, taken during selection.
#[derive(Clone, Debug)]
pub struct DeviceProfile {
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub geometry_shader: bool,
    pub sampler_anisotropy: bool,
    pub extensions: Vec<String>,
    pub families: QueueFamilyIndices,
    pub surface_complete: bool,
}

/// Every flag set here must hold for a device to be picked.
#[derive(Clone, Debug)]
pub struct DeviceRequirements {
    pub require_discrete: bool,
    pub require_geometry_shader: bool,
    pub require_sampler_anisotropy: bool,
    /// Needs a present-capable queue and a complete surface descriptor.
    pub require_presentation: bool,
    pub extensions: Vec<&'static CStr>,
}

impl Default for DeviceRequirements {
    fn default() -> Self {
        Self {
            require_discrete: true,
            require_geometry_shader: true,
            require_sampler_anisotropy: true,
            require_presentation: true,
            extensions: vec![swapchain::NAME],
        }
    }
}

impl DeviceRequirements {
    /// Offscreen use: any device with a graphics queue.
    pub fn headless() -> Self {
        Self {
            require_discrete: false,
            require_geometry_shader: false,
            require_sampler_anisotropy: false,
            require_presentation: false,
            extensions: Vec::new(),
        }
    }

    /// Human-readable list of unmet requirements; empty means suitable.
    pub fn unmet(&self, p: &DeviceProfile) -> Vec<String> {
        let mut out = Vec::new();
        if self.require_discrete && p.device_type != vk::PhysicalDeviceType::DISCRETE_GPU {
            out.push("not a discrete GPU".to_owned());
        }
        if self.require_geometry_shader && !p.geometry_shader {
            out.push("no geometry shader support".to_owned());
        }
        if self.require_sampler_anisotropy && !p.sampler_anisotropy {
            out.push("no sampler anisotropy".to_owned());
        }
        for ext in &self.extensions {
            let want = ext.to_string_lossy();
            if !p.extensions.iter().any(|have| *have == want) {
                out.push(format!("missing {want}"));
            }
        }
        if self.require_presentation {
            if !p.families.is_complete() {
                out.push("incomplete queue families".to_owned());
            }
            if !p.surface_complete {
                out.push("surface reports no formats or present modes".to_owned());
            }
        } else if p.families.graphics.is_none() {
            out.push("no graphics queue".to_owned());
        }
        out
    }

    pub fn is_satisfied_by(&self, p: &DeviceProfile) -> bool {
        self.unmet(p).is_empty()
    }
}

/// Index of the device to use: the first suitable discrete GPU, else the
/// first suitable device of any type.
pub fn pick_device(profiles: &[DeviceProfile], req: &DeviceRequirements) -> Option<usize> {
    profiles
        .iter()
        .enumerate()
        .filter(|(_, p)| req.is_satisfied_by(p))
        .min_by_key(|(_, p)| (p.device_type != vk::PhysicalDeviceType::DISCRETE_GPU) as u8)
        .map(|(i, _)| i)
}

pub fn find_memory_type(
    props: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> Result<u32> {
    let count = (props.memory_type_count as usize).min(props.memory_types.len());
    props.memory_types[..count]
        .iter()
        .enumerate()
        .find(|(i, t)| type_bits & (1u32 << i) != 0 && t.property_flags.contains(required))
        .map(|(i, _)| i as u32)
        .ok_or(VkError::NoSuitableMemoryType {
            type_bits,
            required,
        })
}

pub(crate) fn map_severity(flags: vk::DebugUtilsMessageSeverityFlagsEXT) -> Severity {
    use vk::DebugUtilsMessageSeverityFlagsEXT as S;
    if flags.contains(S::ERROR) {
        Severity::Error
    } else if flags.contains(S::WARNING) {
        Severity::Warning
    } else if flags.contains(S::INFO) {
        Severity::Info
    } else {
        Severity::Verbose
    }
}

pub(crate) fn message_category(types: vk::DebugUtilsMessageTypeFlagsEXT) -> &'static str {
    use vk::DebugUtilsMessageTypeFlagsEXT as T;
    if types.contains(T::VALIDATION) {
        "validation"
    } else if types.contains(T::PERFORMANCE) {
        "performance"
    } else {
        "general"
    }
}

unsafe extern "system" fn forward_to_sink(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    user: *mut c_void,
) -> vk::Bool32 {
    if data.is_null() || user.is_null() {
        return vk::FALSE;
    }
    // SAFETY: `user` is the boxed sink owned by the messenger, which outlives
    // the messenger handle. `data` is valid for the duration of the call.
    let (sink, message) = unsafe {
        let sink = &*(user as *const Arc<dyn DiagnosticSink>);
        let p = (*data).p_message;
        let message: Cow<'_, str> = if p.is_null() {
            Cow::Borrowed("")
        } else {
            CStr::from_ptr(p).to_string_lossy()
        };
        (sink, message)
    };
    sink.report(map_severity(severity), message_category(types), &message);
    vk::FALSE
}

struct DebugMessenger {
    loader: debug_utils::Instance,
    handle: vk::DebugUtilsMessengerEXT,
    _sink: Box<Arc<dyn DiagnosticSink>>,
}

impl DebugMessenger {
    fn new(entry: &Entry, instance: &ash::Instance, sink: Arc<dyn DiagnosticSink>) -> Result<Self> {
        let loader = debug_utils::Instance::new(entry, instance);
        let sink = Box::new(sink);
        let ci = vk::DebugUtilsMessengerCreateInfoEXT {
            s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
            message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            pfn_user_callback: Some(forward_to_sink),
            p_user_data: &*sink as *const Arc<dyn DiagnosticSink> as *mut c_void,
            ..Default::default()
        };
        let handle = unsafe { loader.create_debug_utils_messenger(&ci, None) }
            .op("vkCreateDebugUtilsMessengerEXT")?;
        Ok(Self {
            loader,
            handle,
            _sink: sink,
        })
    }
}

fn layer_available(entry: &Entry, name: &CStr) -> bool {
    unsafe { entry.enumerate_instance_layer_properties() }
        .unwrap_or_default()
        .iter()
        .any(|l| fixed_cstr(&l.layer_name) == name.to_string_lossy())
}

fn instance_extension_available(entry: &Entry, name: &CStr, layer: Option<&CStr>) -> bool {
    [None, layer].into_iter().any(|source| {
        unsafe { entry.enumerate_instance_extension_properties(source) }
            .unwrap_or_default()
            .iter()
            .any(|e| fixed_cstr(&e.extension_name) == name.to_string_lossy())
    })
}

/// Decodes a NUL-terminated name from a fixed-size Vulkan array.
pub(crate) fn fixed_cstr(raw: &[c_char]) -> String {
    CStr::from_bytes_until_nul(bytemuck::cast_slice(raw))
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Loader entry, instance and the instance-scoped objects hanging off it.
pub(crate) struct InstanceHandles {
    pub(crate) entry: Entry,
    pub(crate) instance: ash::Instance,
    pub(crate) surface_loader: surface::Instance,
    debug: Option<DebugMessenger>,
}

impl InstanceHandles {
    fn create(display: Option<RawDisplayHandle>, sink: Arc<dyn DiagnosticSink>) -> Result<Self> {
        let entry = unsafe { Entry::load() }?;

        let mut extensions: Vec<*const c_char> = match display {
            Some(d) => ash_window::enumerate_required_extensions(d)
                .op("vkEnumerateInstanceExtensionProperties")?
                .to_vec(),
            None => Vec::new(),
        };

        let validation = cfg!(debug_assertions)
            && layer_available(&entry, VALIDATION_LAYER)
            && instance_extension_available(&entry, debug_utils::NAME, Some(VALIDATION_LAYER));
        if cfg!(debug_assertions) && !validation {
            warn!("validation layer unavailable; running without it");
        }
        let layers: Vec<*const c_char> = if validation {
            extensions.push(debug_utils::NAME.as_ptr());
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            Vec::new()
        };

        let app_info = vk::ApplicationInfo {
            s_type: vk::StructureType::APPLICATION_INFO,
            p_application_name: ENGINE_NAME.as_ptr(),
            application_version: 0,
            p_engine_name: ENGINE_NAME.as_ptr(),
            engine_version: 0,
            api_version: vk::API_VERSION_1_1,
            ..Default::default()
        };
        let create_info = vk::InstanceCreateInfo {
            s_type: vk::StructureType::INSTANCE_CREATE_INFO,
            p_application_info: &app_info,
            enabled_extension_count: extensions.len() as u32,
            pp_enabled_extension_names: extensions.as_ptr(),
            enabled_layer_count: layers.len() as u32,
            pp_enabled_layer_names: layers.as_ptr(),
            ..Default::default()
        };
        let instance =
            unsafe { entry.create_instance(&create_info, None) }.op("vkCreateInstance")?;
        let surface_loader = surface::Instance::new(&entry, &instance);

        let mut handles = Self {
            entry,
            instance,
            surface_loader,
            debug: None,
        };
        if validation {
            handles.debug = Some(DebugMessenger::new(
                &handles.entry,
                &handles.instance,
                sink,
            )?);
            info!("validation layer enabled");
        }
        Ok(handles)
    }
}

impl Drop for InstanceHandles {
    fn drop(&mut self) {
        unsafe {
            if let Some(d) = self.debug.take() {
                d.loader.destroy_debug_utils_messenger(d.handle, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

struct OpenedDevice {
    device: ash::Device,
    physical: vk::PhysicalDevice,
    profile: DeviceProfile,
    graphics_family: u32,
    present_family: u32,
    compute_family: u32,
}

fn profile_device(
    instance: &InstanceHandles,
    physical: vk::PhysicalDevice,
    surface: Option<&PresentSurface>,
) -> Result<DeviceProfile> {
    let inst = &instance.instance;
    let (props, features, queue_props) = unsafe {
        (
            inst.get_physical_device_properties(physical),
            inst.get_physical_device_features(physical),
            inst.get_physical_device_queue_family_properties(physical),
        )
    };
    let extensions = unsafe { inst.enumerate_device_extension_properties(physical) }
        .op("vkEnumerateDeviceExtensionProperties")?
        .iter()
        .map(|e| fixed_cstr(&e.extension_name))
        .collect();

    let families = QueueFamilyIndices::resolve(&queue_props, |family| {
        surface.is_some_and(|s| s.supported_by(physical, family))
    });
    let surface_complete = surface.is_some_and(|s| {
        SurfaceSupport::query(&instance.surface_loader, physical, s.handle())
            .is_ok_and(|support| support.is_complete())
    });

    Ok(DeviceProfile {
        name: fixed_cstr(&props.device_name),
        device_type: props.device_type,
        geometry_shader: features.geometry_shader == vk::TRUE,
        sampler_anisotropy: features.sampler_anisotropy == vk::TRUE,
        extensions,
        families,
        surface_complete,
    })
}

fn open_device(
    instance: &InstanceHandles,
    surface: Option<&PresentSurface>,
    req: &DeviceRequirements,
) -> Result<OpenedDevice> {
    let candidates =
        unsafe { instance.instance.enumerate_physical_devices() }.op("vkEnumeratePhysicalDevices")?;

    let mut profiles = Vec::with_capacity(candidates.len());
    for &physical in &candidates {
        let profile = profile_device(instance, physical, surface)?;
        let unmet = req.unmet(&profile);
        if unmet.is_empty() {
            debug!(device = %profile.name, "device is suitable");
        } else {
            debug!(device = %profile.name, "skipping device: {}", unmet.join(", "));
        }
        profiles.push(profile);
    }
    let idx = pick_device(&profiles, req).ok_or(VkError::NoSuitableDevice)?;
    let physical = candidates[idx];
    let profile = profiles.swap_remove(idx);

    let graphics_family = profile
        .families
        .graphics
        .ok_or(VkError::IncompleteQueueFamilies("no graphics queue"))?;
    let present_family = if req.require_presentation {
        profile
            .families
            .present
            .ok_or(VkError::IncompleteQueueFamilies("no present queue"))?
    } else {
        graphics_family
    };
    let compute_family = profile.families.compute.unwrap_or(graphics_family);

    let unique = QueueFamilyIndices {
        graphics: Some(graphics_family),
        present: Some(present_family),
        compute: Some(compute_family),
    }
    .unique();

    let priority = [1.0f32];
    let queue_infos: Vec<vk::DeviceQueueCreateInfo> = unique
        .iter()
        .map(|&family| vk::DeviceQueueCreateInfo {
            s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
            queue_family_index: family,
            queue_count: 1,
            p_queue_priorities: priority.as_ptr(),
            ..Default::default()
        })
        .collect();

    let features = vk::PhysicalDeviceFeatures {
        sampler_anisotropy: if profile.sampler_anisotropy {
            vk::TRUE
        } else {
            vk::FALSE
        },
        ..Default::default()
    };
    let ext_ptrs: Vec<*const c_char> = req.extensions.iter().map(|e| e.as_ptr()).collect();

    let create_info = vk::DeviceCreateInfo {
        s_type: vk::StructureType::DEVICE_CREATE_INFO,
        queue_create_info_count: queue_infos.len() as u32,
        p_queue_create_infos: queue_infos.as_ptr(),
        enabled_extension_count: ext_ptrs.len() as u32,
        pp_enabled_extension_names: ext_ptrs.as_ptr(),
        p_enabled_features: &features,
        ..Default::default()
    };
    let device = unsafe { instance.instance.create_device(physical, &create_info, None) }
        .op("vkCreateDevice")?;

    info!(
        device = %profile.name,
        kind = ?profile.device_type,
        graphics = graphics_family,
        present = present_family,
        compute = compute_family,
        "logical device created"
    );

    Ok(OpenedDevice {
        device,
        physical,
        profile,
        graphics_family,
        present_family,
        compute_family,
    })
}

/// Instance, logical device and queues shared by every renderer.
///
/// Owners hold it through `Rc`; the device is destroyed once the last
/// resource referencing it is gone.
pub struct DeviceContext {
    device: ash::Device,
    physical: vk::PhysicalDevice,
    name: String,
    families: QueueFamilyIndices,
    graphics_family: u32,
    present_family: u32,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    compute_queue: vk::Queue,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    limits: vk::PhysicalDeviceLimits,
    anisotropy: bool,
    swapchain_loader: swapchain::Device,
    instance: InstanceHandles,
}

impl DeviceContext {
    /// Creates the instance, a surface for the first window and a device
    /// that can present to it.
    pub fn new(
        display: RawDisplayHandle,
        window: RawWindowHandle,
        requirements: &DeviceRequirements,
        sink: Arc<dyn DiagnosticSink>,
    ) -> Result<(Rc<Self>, PresentSurface)> {
        let instance = InstanceHandles::create(Some(display), sink)?;
        let surface = PresentSurface::create(&instance, display, window)?;
        let opened = open_device(&instance, Some(&surface), requirements)?;
        Ok((Rc::new(Self::assemble(instance, opened)), surface))
    }

    /// A device with no presentation support, for offscreen work and tests.
    pub fn new_headless(sink: Arc<dyn DiagnosticSink>) -> Result<Rc<Self>> {
        let instance = InstanceHandles::create(None, sink)?;
        let opened = open_device(&instance, None, &DeviceRequirements::headless())?;
        Ok(Rc::new(Self::assemble(instance, opened)))
    }

    fn assemble(instance: InstanceHandles, opened: OpenedDevice) -> Self {
        let OpenedDevice {
            device,
            physical,
            profile,
            graphics_family,
            present_family,
            compute_family,
        } = opened;
        let inst = &instance.instance;
        let (memory_properties, props) = unsafe {
            (
                inst.get_physical_device_memory_properties(physical),
                inst.get_physical_device_properties(physical),
            )
        };
        let (graphics_queue, present_queue, compute_queue) = unsafe {
            (
                device.get_device_queue(graphics_family, 0),
                device.get_device_queue(present_family, 0),
                device.get_device_queue(compute_family, 0),
            )
        };
        let swapchain_loader = swapchain::Device::new(inst, &device);

        Self {
            device,
            physical,
            name: profile.name,
            families: profile.families,
            graphics_family,
            present_family,
            graphics_queue,
            present_queue,
            compute_queue,
            memory_properties,
            limits: props.limits,
            anisotropy: profile.sampler_anisotropy,
            swapchain_loader,
            instance,
        }
    }

    /// Surface for an additional window. The device must be able to present
    /// to it from the already chosen present family.
    pub fn create_surface(
        &self,
        display: RawDisplayHandle,
        window: RawWindowHandle,
    ) -> Result<PresentSurface> {
        let surface = PresentSurface::create(&self.instance, display, window)?;
        if !surface.supported_by(self.physical, self.present_family) {
            return Err(VkError::SurfaceNotSupported(self.present_family));
        }
        Ok(surface)
    }

    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub fn instance(&self) -> &ash::Instance {
        &self.instance.instance
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical
    }

    pub fn device_name(&self) -> &str {
        &self.name
    }

    pub fn families(&self) -> QueueFamilyIndices {
        self.families
    }

    pub fn graphics_family(&self) -> u32 {
        self.graphics_family
    }

    pub fn present_family(&self) -> u32 {
        self.present_family
    }

    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    pub fn compute_queue(&self) -> vk::Queue {
        self.compute_queue
    }

    pub(crate) fn surface_loader(&self) -> &surface::Instance {
        &self.instance.surface_loader
    }

    pub(crate) fn swapchain_loader(&self) -> &swapchain::Device {
        &self.swapchain_loader
    }

    pub fn validation_enabled(&self) -> bool {
        self.instance.debug.is_some()
    }

    pub fn find_memory_type(&self, type_bits: u32, required: vk::MemoryPropertyFlags) -> Result<u32> {
        find_memory_type(&self.memory_properties, type_bits, required)
    }

    pub(crate) fn allocate_memory(
        &self,
        req: vk::MemoryRequirements,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<vk::DeviceMemory> {
        let info = vk::MemoryAllocateInfo {
            s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
            allocation_size: req.size,
            memory_type_index: self.find_memory_type(req.memory_type_bits, properties)?,
            ..Default::default()
        };
        unsafe { self.device.allocate_memory(&info, None) }.map_err(|code| {
            VkError::AllocationFailed {
                size: req.size,
                code,
            }
        })
    }

    pub fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        unsafe {
            self.instance
                .instance
                .get_physical_device_format_properties(self.physical, format)
        }
    }

    /// Device limit when the anisotropy feature was enabled.
    pub fn max_sampler_anisotropy(&self) -> Option<f32> {
        self.anisotropy.then_some(self.limits.max_sampler_anisotropy)
    }

    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }.op("vkDeviceWaitIdle")
    }
}

impl Drop for DeviceContext {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    fn discrete_profile() -> DeviceProfile {
        DeviceProfile {
            name: "Test GPU".into(),
            device_type: vk::PhysicalDeviceType::DISCRETE_GPU,
            geometry_shader: true,
            sampler_anisotropy: true,
            extensions: vec!["VK_KHR_swapchain".into()],
            families: QueueFamilyIndices {
                graphics: Some(0),
                present: Some(0),
                compute: Some(0),
            },
            surface_complete: true,
        }
    }

    #[test]
    fn present_prefers_the_graphics_family() {
        let fams = [
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
        ];
        let q = QueueFamilyIndices::resolve(&fams, |_| true);
        assert_eq!(q.graphics, Some(1));
        assert_eq!(q.present, Some(1));
        assert_eq!(q.compute, Some(1));
        assert_eq!(q.unique(), vec![1]);
    }

    #[test]
    fn present_falls_back_to_any_capable_family() {
        let fams = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::COMPUTE),
        ];
        let q = QueueFamilyIndices::resolve(&fams, |i| i == 1);
        assert_eq!(q.graphics, Some(0));
        assert_eq!(q.present, Some(1));
        assert!(q.is_complete());
        assert_eq!(q.unique(), vec![0, 1]);
    }

    #[test]
    fn incomplete_without_presentation() {
        let q = QueueFamilyIndices::resolve(&[family(vk::QueueFlags::GRAPHICS)], |_| false);
        assert_eq!(q.present, None);
        assert_eq!(q.compute, None);
        assert!(!q.is_complete());
    }

    #[test]
    fn empty_families_are_skipped() {
        let mut empty = family(vk::QueueFlags::GRAPHICS);
        empty.queue_count = 0;
        let q = QueueFamilyIndices::resolve(&[empty, family(vk::QueueFlags::GRAPHICS)], |_| true);
        assert_eq!(q.graphics, Some(1));
        assert_eq!(q.present, Some(1));
    }

    #[test]
    fn suitability_needs_every_condition() {
        let req = DeviceRequirements::default();
        assert!(req.is_satisfied_by(&discrete_profile()));

        let mut p = discrete_profile();
        p.device_type = vk::PhysicalDeviceType::INTEGRATED_GPU;
        assert!(!req.is_satisfied_by(&p));

        let mut p = discrete_profile();
        p.geometry_shader = false;
        assert!(!req.is_satisfied_by(&p));

        let mut p = discrete_profile();
        p.extensions.clear();
        assert_eq!(req.unmet(&p), vec!["missing VK_KHR_swapchain".to_owned()]);

        let mut p = discrete_profile();
        p.surface_complete = false;
        assert!(!req.is_satisfied_by(&p));

        let mut p = discrete_profile();
        p.families.compute = None;
        assert!(!req.is_satisfied_by(&p));
    }

    #[test]
    fn relaxed_requirements_accept_integrated() {
        let req = DeviceRequirements {
            require_discrete: false,
            ..Default::default()
        };
        let mut p = discrete_profile();
        p.device_type = vk::PhysicalDeviceType::INTEGRATED_GPU;
        assert!(req.is_satisfied_by(&p));
    }

    #[test]
    fn headless_only_needs_graphics() {
        let req = DeviceRequirements::headless();
        let p = DeviceProfile {
            name: "cpu".into(),
            device_type: vk::PhysicalDeviceType::CPU,
            geometry_shader: false,
            sampler_anisotropy: false,
            extensions: Vec::new(),
            families: QueueFamilyIndices {
                graphics: Some(0),
                ..Default::default()
            },
            surface_complete: false,
        };
        assert!(req.is_satisfied_by(&p));
        let none = DeviceProfile {
            families: QueueFamilyIndices::default(),
            ..p
        };
        assert!(!req.is_satisfied_by(&none));
    }

    #[test]
    fn pick_prefers_discrete_among_suitable() {
        let req = DeviceRequirements {
            require_discrete: false,
            ..Default::default()
        };
        let mut integrated = discrete_profile();
        integrated.device_type = vk::PhysicalDeviceType::INTEGRATED_GPU;
        let mut broken = discrete_profile();
        broken.sampler_anisotropy = false;

        let profiles = [integrated.clone(), broken, discrete_profile()];
        assert_eq!(pick_device(&profiles, &req), Some(2));
        assert_eq!(pick_device(&[integrated], &req), Some(0));
        assert_eq!(pick_device(&[], &req), None);
    }

    #[test]
    fn memory_type_lookup() {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: 3,
            ..Default::default()
        };
        props.memory_types[0].property_flags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
        props.memory_types[1].property_flags =
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        props.memory_types[2].property_flags = vk::MemoryPropertyFlags::DEVICE_LOCAL
            | vk::MemoryPropertyFlags::HOST_VISIBLE
            | vk::MemoryPropertyFlags::HOST_COHERENT;

        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        assert_eq!(find_memory_type(&props, 0b111, host).unwrap(), 1);
        assert_eq!(find_memory_type(&props, 0b101, host).unwrap(), 2);
        assert_eq!(
            find_memory_type(&props, 0b111, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap(),
            0
        );
        assert!(matches!(
            find_memory_type(&props, 0b001, host),
            Err(VkError::NoSuitableMemoryType { type_bits: 1, .. })
        ));
    }

    #[test]
    fn memory_types_past_the_count_are_ignored() {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: 1,
            ..Default::default()
        };
        props.memory_types[1].property_flags = vk::MemoryPropertyFlags::HOST_VISIBLE;
        assert!(find_memory_type(&props, u32::MAX, vk::MemoryPropertyFlags::HOST_VISIBLE).is_err());
    }

    #[test]
    fn validation_messages_map_to_sink_levels() {
        use vk::DebugUtilsMessageSeverityFlagsEXT as S;
        use vk::DebugUtilsMessageTypeFlagsEXT as T;
        assert_eq!(map_severity(S::ERROR), Severity::Error);
        assert_eq!(map_severity(S::WARNING), Severity::Warning);
        assert_eq!(map_severity(S::INFO), Severity::Info);
        assert_eq!(map_severity(S::VERBOSE), Severity::Verbose);
        assert_eq!(message_category(T::VALIDATION), "validation");
        assert_eq!(message_category(T::PERFORMANCE), "performance");
        assert_eq!(message_category(T::GENERAL), "general");
    }

    #[test]
    fn callback_forwards_to_the_boxed_sink() {
        use std::sync::Mutex;

        #[derive(Default)]
        struct Collect(Mutex<Vec<(Severity, String)>>);
        impl DiagnosticSink for Collect {
            fn report(&self, severity: Severity, _category: &str, message: &str) {
                self.0.lock().unwrap().push((severity, message.to_owned()));
            }
        }

        let collect = Arc::new(Collect::default());
        let boxed: Box<Arc<dyn DiagnosticSink>> = Box::new(collect.clone());
        let text = c"vkCmdDraw: pipeline not bound";
        let data = vk::DebugUtilsMessengerCallbackDataEXT {
            p_message: text.as_ptr(),
            ..Default::default()
        };
        let ret = unsafe {
            forward_to_sink(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
                vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION,
                &data,
                &*boxed as *const Arc<dyn DiagnosticSink> as *mut c_void,
            )
        };
        assert_eq!(ret, vk::FALSE);
        let seen = collect.0.lock().unwrap();
        assert_eq!(
            seen.as_slice(),
            &[(Severity::Error, "vkCmdDraw: pipeline not bound".to_owned())]
        );
    }

    #[test]
    fn fixed_names_stop_at_nul() {
        let mut raw = [0 as c_char; 16];
        for (dst, src) in raw.iter_mut().zip(b"VK_KHR_swapchain".iter().take(15)) {
            *dst = *src as c_char;
        }
        assert_eq!(fixed_cstr(&raw), "VK_KHR_swapchai");
        assert_eq!(fixed_cstr(&[0 as c_char; 4]), "");
    }
}
