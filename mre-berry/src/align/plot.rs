//! 对齐诊断图.

use super::AlignmentReport;
use crate::consts::gray::{BLACK, GRAY, WHITE};
use crate::MreResult;
use image::{GrayImage, Luma};
use std::path::Path;

const BAR_WIDTH: u32 = 6;
const BAR_GAP: u32 = 2;
const PLOT_HEIGHT: u32 = 160;
const MEAN_LINE: u8 = 0x60;

impl AlignmentReport {
    /// 把每个切片的标准差画成柱状图保存为 PNG.
    ///
    /// 峰值柱为白色, 其余柱为灰色, 信号均值为一条暗灰色水平线.
    pub fn save_plot<P: AsRef<Path>>(&self, path: P) -> MreResult<()> {
        let n = self.signal.len().max(1) as u32;
        let width = n * (BAR_WIDTH + BAR_GAP) + BAR_GAP;
        let mut buf = GrayImage::from_pixel(width, PLOT_HEIGHT, Luma([BLACK]));

        let top = self.signal.iter().copied().fold(0.0f64, f64::max);
        let max_row = (PLOT_HEIGHT - 1) as f64;
        let to_rows = |v: f64| -> u32 {
            if top > 0.0 {
                ((v / top) * max_row).round().clamp(0.0, max_row) as u32
            } else {
                0
            }
        };

        for (i, &v) in self.signal.iter().enumerate() {
            let color = if self.peaks.contains(&i) { WHITE } else { GRAY };
            let x0 = BAR_GAP + i as u32 * (BAR_WIDTH + BAR_GAP);
            let rows = to_rows(v);
            for x in x0..x0 + BAR_WIDTH {
                for r in 0..rows {
                    buf.put_pixel(x, PLOT_HEIGHT - 1 - r, Luma([color]));
                }
            }
        }

        let mean_row = PLOT_HEIGHT - 1 - to_rows(super::peaks::mean(&self.signal));
        for x in 0..width {
            if buf.get_pixel(x, mean_row).0[0] == BLACK {
                buf.put_pixel(x, mean_row, Luma([MEAN_LINE]));
            }
        }
        buf.save(path)?;
        Ok(())
    }
}
