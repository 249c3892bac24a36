//! Image gallery of an entry being edited.

/// Where an image in the gallery currently lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageKind {
    /// Already part of the saved entry. `download_url` is `None` when the
    /// object store could not resolve it.
    Existing { download_url: Option<String> },
    /// Picked locally in this session, not saved yet.
    Attached { source_uri: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GalleryImage {
    pub remote_path: String,
    pub kind: ImageKind,
}

impl GalleryImage {
    pub fn is_attached(&self) -> bool {
        matches!(self.kind, ImageKind::Attached { .. })
    }
}

/// Gallery plus the set of saved images removed from it since the last save.
#[derive(Debug, Clone, Default)]
pub struct GalleryState {
    images: Vec<GalleryImage>,
    removed: Vec<String>,
}

impl GalleryState {
    pub fn from_existing(images: Vec<(String, Option<String>)>) -> Self {
        Self {
            images: images
                .into_iter()
                .map(|(remote_path, download_url)| GalleryImage {
                    remote_path,
                    kind: ImageKind::Existing { download_url },
                })
                .collect(),
            removed: Vec::new(),
        }
    }

    pub fn images(&self) -> &[GalleryImage] {
        &self.images
    }

    pub fn contains(&self, remote_path: &str) -> bool {
        self.images.iter().any(|i| i.remote_path == remote_path)
    }

    pub fn attach(&mut self, remote_path: String, source_uri: String) {
        self.images.push(GalleryImage {
            remote_path,
            kind: ImageKind::Attached { source_uri },
        });
    }

    /// Take an image out of the gallery.
    ///
    /// A saved image is remembered so its remote object gets deleted on the
    /// next save; an image attached in this session is simply dropped.
    pub fn remove(&mut self, remote_path: &str) -> bool {
        let Some(pos) = self.images.iter().position(|i| i.remote_path == remote_path) else {
            return false;
        };
        let image = self.images.remove(pos);
        if !image.is_attached() {
            self.removed.push(image.remote_path);
        }
        true
    }

    /// `(remote_path, source_uri)` of every image waiting for its first upload.
    pub fn attached(&self) -> Vec<(String, String)> {
        self.images
            .iter()
            .filter_map(|i| match &i.kind {
                ImageKind::Attached { source_uri } => {
                    Some((i.remote_path.clone(), source_uri.clone()))
                }
                ImageKind::Existing { .. } => None,
            })
            .collect()
    }

    pub fn removed(&self) -> &[String] {
        &self.removed
    }

    /// Remote paths in gallery order, as they are written to the entry.
    pub fn remote_paths(&self) -> Vec<String> {
        self.images.iter().map(|i| i.remote_path.clone()).collect()
    }

    /// Everything in the gallery is now part of the saved entry.
    pub fn commit(&mut self) {
        for image in &mut self.images {
            if image.is_attached() {
                image.kind = ImageKind::Existing { download_url: None };
            }
        }
        self.removed.clear();
    }
}
