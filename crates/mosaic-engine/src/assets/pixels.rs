use crate::paint::Color;

/// CPU-side RGBA8 image (straight alpha, row-major, no padding).
///
/// `readable == false` marks a buffer whose pixels may be drawn but not read
/// back, which is how pixel filters detect tainted sources.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Vec<u8>,
    readable: bool,
}

impl PixelBuffer {
    /// Transparent buffer of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * 4],
            readable: true,
        }
    }

    pub fn filled(width: u32, height: u32, color: Color) -> Self {
        let px = color.to_rgba8();
        let mut buf = Self::new(width, height);
        for chunk in buf.data.chunks_exact_mut(4) {
            chunk.copy_from_slice(&px);
        }
        buf
    }

    /// Wraps raw RGBA bytes. Returns `None` if the length does not match.
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        (data.len() == width as usize * height as usize * 4).then_some(Self {
            width,
            height,
            data,
            readable: true,
        })
    }

    pub fn from_image(img: image::DynamicImage) -> Self {
        let rgba = img.into_rgba8();
        let (width, height) = rgba.dimensions();
        Self { width, height, data: rgba.into_raw(), readable: true }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn is_readable(&self) -> bool {
        self.readable
    }

    pub fn set_readable(&mut self, readable: bool) {
        self.readable = readable;
    }

    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        if x >= self.width || y >= self.height {
            return [0; 4];
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }

    #[inline]
    pub fn set_pixel(&mut self, x: u32, y: u32, px: [u8; 4]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        self.data[i..i + 4].copy_from_slice(&px);
    }

    /// Resizes to `width`x`height`, discarding contents (all pixels transparent).
    pub fn reset(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.data.clear();
        self.data.resize(width as usize * height as usize * 4, 0);
    }

    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    /// Encodes the buffer as PNG.
    pub fn to_png(&self) -> Result<Vec<u8>, image::ImageError> {
        let mut out = std::io::Cursor::new(Vec::new());
        image::write_buffer_with_format(
            &mut out,
            &self.data,
            self.width,
            self.height,
            image::ExtendedColorType::Rgba8,
            image::ImageFormat::Png,
        )?;
        Ok(out.into_inner())
    }
}
