use super::{DistMatrix, DistRead, DistWrite};
use crate::dist::DistMeta;
use crate::dtype::Element;
use crate::error::Result;
use crate::matrix::{MatrixMut, MatrixRef};
use crate::redist;

/// Read-only window into a distributed matrix
///
/// Its alignment is fixed by the window position; it cannot be resized or
/// realigned, and it has no write access.
#[derive(Clone)]
pub struct DistView<'a, T> {
    meta: DistMeta,
    local: MatrixRef<'a, T>,
}

impl<'a, T: Element> DistView<'a, T> {
    pub(crate) fn from_parts(meta: DistMeta, local: MatrixRef<'a, T>) -> Self {
        Self { meta, local }
    }
}

impl<T: Element> DistRead<T> for DistView<'_, T> {
    #[inline]
    fn meta(&self) -> &DistMeta {
        &self.meta
    }

    #[inline]
    fn local(&self) -> MatrixRef<'_, T> {
        self.local
    }
}

/// Writable window into a distributed matrix
///
/// Writes land in the parent's local storage. Like [`DistView`] it cannot be
/// resized or realigned.
pub struct DistViewMut<'a, T> {
    meta: DistMeta,
    local: MatrixMut<'a, T>,
}

impl<'a, T: Element> DistViewMut<'a, T> {
    pub(crate) fn from_parts(meta: DistMeta, local: MatrixMut<'a, T>) -> Self {
        Self { meta, local }
    }

    /// Redistribute `src` into this window's layout and copy it in place
    ///
    /// Collective over the owning processes.
    pub fn assign<S: DistRead<T> + ?Sized>(&mut self, src: &S) -> Result<()> {
        assert_eq!(
            (src.height(), src.width()),
            (self.meta.height(), self.meta.width()),
            "cannot assign a differently shaped matrix into a view"
        );
        let mut target = self.meta.clone();
        target.col_constrained = true;
        target.row_constrained = true;
        let moved: DistMatrix<T> = redist::redistribute(src.meta(), src.local(), &target)?;
        self.local.copy_from(moved.local());
        Ok(())
    }
}

impl<T: Element> DistRead<T> for DistViewMut<'_, T> {
    #[inline]
    fn meta(&self) -> &DistMeta {
        &self.meta
    }

    #[inline]
    fn local(&self) -> MatrixRef<'_, T> {
        self.local.rb()
    }
}

impl<T: Element> DistWrite<T> for DistViewMut<'_, T> {
    #[inline]
    fn local_mut(&mut self) -> MatrixMut<'_, T> {
        self.local.rb_mut()
    }
}
