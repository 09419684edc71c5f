//! # Swap Chain
//!
//! The swap chain is rebuilt, never patched: a resize destroys it and
//! creates a new one from fresh surface capabilities. The core tracks the
//! layout of every image so presentation can be validated.

use smallvec::SmallVec;
use tracing::{info, warn};

use crate::backend::{GpuBackend, SurfaceCapabilities, SwapChainConfig};
use crate::error::{RenderError, RenderResult};
use crate::renderer::Renderer;
use crate::types::{ColorSpace, Extent2d, Format, ImageLayout, PresentMode};

/// Longest swap chain the core asks for.
pub const MAX_SWAP_CHAIN_IMAGES: usize = 8;

/// Core-side state of the swap chain.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SwapChain {
    config: Option<SwapChainConfig>,
    image_layouts: SmallVec<[ImageLayout; MAX_SWAP_CHAIN_IMAGES]>,
    active_image: u32,
}

impl SwapChain {
    /// True between init and destroy.
    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.config.is_some()
    }

    /// Parameters of the live chain.
    #[must_use]
    pub const fn config(&self) -> Option<&SwapChainConfig> {
        self.config.as_ref()
    }

    /// Image size, zero when there is no chain.
    #[must_use]
    pub fn extent(&self) -> Extent2d {
        self.config.map(|c| c.extent).unwrap_or_default()
    }

    /// Number of images.
    #[must_use]
    pub fn image_count(&self) -> u32 {
        u32::try_from(self.image_layouts.len()).unwrap_or(u32::MAX)
    }

    /// Image returned by the last acquire.
    #[must_use]
    pub const fn active_image(&self) -> u32 {
        self.active_image
    }

    /// Tracked layout of `image`.
    ///
    /// # Errors
    ///
    /// [`RenderError::NoSwapChain`], or an image index out of range.
    pub fn image_layout(&self, image: u32) -> RenderResult<ImageLayout> {
        if !self.is_initialized() {
            return Err(RenderError::NoSwapChain);
        }
        self.image_layouts
            .get(image as usize)
            .copied()
            .ok_or(RenderError::InvalidArgument("swap chain image out of range"))
    }

    pub(crate) fn set_image_layout(&mut self, image: u32, layout: ImageLayout) -> RenderResult<()> {
        if !self.is_initialized() {
            return Err(RenderError::NoSwapChain);
        }
        let slot = self
            .image_layouts
            .get_mut(image as usize)
            .ok_or(RenderError::InvalidArgument("swap chain image out of range"))?;
        *slot = layout;
        Ok(())
    }

    pub(crate) fn set_active_image(&mut self, image: u32) -> RenderResult<()> {
        self.image_layout(image)?;
        self.active_image = image;
        Ok(())
    }
}

/// Picks format, present mode, extent and image count for a surface.
///
/// Prefers BGRA8_UNORM in sRGB non-linear and MAILBOX, falling back to the
/// first entry the surface lists. The surface's own extent wins over
/// `requested` when it dictates one.
///
/// # Errors
///
/// [`RenderError::NoSurfaceSupport`] if the surface lists no formats or no
/// present modes.
pub fn choose_swap_chain_config(
    caps: &SurfaceCapabilities,
    requested: Extent2d,
) -> RenderResult<SwapChainConfig> {
    let (Some(&first_format), Some(&first_mode)) = (caps.formats.first(), caps.present_modes.first())
    else {
        return Err(RenderError::NoSurfaceSupport);
    };

    let surface_format = caps
        .formats
        .iter()
        .copied()
        .find(|f| f.format == Format::Bgra8Unorm && f.color_space == ColorSpace::SrgbNonLinear)
        .unwrap_or_else(|| {
            warn!(format = ?first_format.format, "preferred swap chain format unavailable");
            first_format
        });

    let present_mode = if caps.present_modes.contains(&PresentMode::Mailbox) {
        PresentMode::Mailbox
    } else {
        warn!(mode = ?first_mode, "mailbox present mode unavailable");
        first_mode
    };

    let mut image_count = caps.min_image_count + 1;
    if caps.max_image_count > 0 {
        image_count = image_count.min(caps.max_image_count);
    }
    image_count = image_count.min(MAX_SWAP_CHAIN_IMAGES as u32);

    Ok(SwapChainConfig {
        format: surface_format.format,
        color_space: surface_format.color_space,
        present_mode,
        extent: caps.current_extent.unwrap_or(requested),
        image_count,
    })
}

impl<B: GpuBackend> Renderer<B> {
    /// Creates the swap chain for a window of `extent`.
    ///
    /// # Errors
    ///
    /// - [`RenderError::InvalidArgument`] if a swap chain already exists
    /// - [`RenderError::NoSurfaceSupport`] for an unusable surface
    /// - backend failure
    pub fn init_swap_chain(&mut self, extent: Extent2d) -> RenderResult<()> {
        if self.swap_chain.is_initialized() {
            return Err(RenderError::InvalidArgument("swap chain already exists"));
        }

        let caps = self.backend.surface_capabilities();
        let config = choose_swap_chain_config(&caps, extent)?;
        let count = self.backend.create_swap_chain(&config)?;

        self.swap_chain = SwapChain {
            config: Some(config),
            image_layouts: SmallVec::from_elem(ImageLayout::Undefined, count as usize),
            active_image: 0,
        };

        info!(
            format = ?config.format,
            present_mode = ?config.present_mode,
            width = config.extent.width,
            height = config.extent.height,
            images = count,
            "swap chain created"
        );
        Ok(())
    }

    /// Releases the native swap chain and zeroes the tracked state. A no-op
    /// without a swap chain.
    pub fn destroy_swap_chain(&mut self) {
        if self.swap_chain.is_initialized() {
            self.backend.destroy_swap_chain();
            self.swap_chain = SwapChain::default();
        }
    }

    /// Swap chain state.
    #[must_use]
    pub const fn swap_chain(&self) -> &SwapChain {
        &self.swap_chain
    }
}
