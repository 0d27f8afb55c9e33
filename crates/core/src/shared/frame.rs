use std::time::Instant;

use ndarray::{ArrayView3, ArrayViewMut3};

/// Bytes per pixel. Frames are always packed BGR triples.
pub const CHANNELS: u8 = 3;

/// A single captured camera frame: contiguous BGR bytes in row-major order.
///
/// Colour conversion happens at I/O boundaries only; the pipeline treats
/// pixel data as opaque BGR.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    index: u64,
    captured_at: Instant,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, index: u64) -> Self {
        Self::with_timestamp(data, width, height, index, Instant::now())
    }

    pub fn with_timestamp(
        data: Vec<u8>,
        width: u32,
        height: u32,
        index: u64,
        captured_at: Instant,
    ) -> Self {
        debug_assert_eq!(
            data.len(),
            Self::buffer_len(width, height),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            index,
            captured_at,
        }
    }

    /// A frame of the given size with every byte set to `value`.
    pub fn filled(width: u32, height: u32, value: u8, index: u64) -> Self {
        Self::new(vec![value; Self::buffer_len(width, height)], width, height, index)
    }

    pub fn buffer_len(width: u32, height: u32) -> usize {
        (width as usize) * (height as usize) * (CHANNELS as usize)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        CHANNELS
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    /// Same metadata, different pixels. Used by effects that produce a copy.
    pub fn with_data(&self, data: Vec<u8>) -> Self {
        Self::with_timestamp(data, self.width, self.height, self.index, self.captured_at)
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    pub fn as_ndarray_mut(&mut self) -> ArrayViewMut3<'_, u8> {
        let shape = self.shape();
        ArrayViewMut3::from_shape(shape, &mut self.data)
            .expect("Frame data length must match dimensions")
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            CHANNELS as usize,
        )
    }
}
