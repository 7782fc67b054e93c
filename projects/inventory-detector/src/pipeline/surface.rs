use std::path::PathBuf;

/// Image handed to a presentation surface.
#[derive(Debug, Clone)]
pub enum ImageSource {
    Bytes { mime: String, data: Vec<u8> },
    Path(PathBuf),
}

/// Anything that can show the pipeline's output to a user.
pub trait PresentationSurface {
    fn show_image(&mut self, image: ImageSource, caption: &str);
    fn show_text(&mut self, text: &str);
    fn show_error(&mut self, message: &str);
}
