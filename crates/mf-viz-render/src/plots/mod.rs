pub mod cls_curve;
pub mod frame;
pub mod profile;
pub mod test_stat;

mod axes_draw;
