pub mod face_align;
pub mod face_detection;
pub mod face_landmark;
