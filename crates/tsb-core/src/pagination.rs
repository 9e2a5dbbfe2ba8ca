use crate::{
    action::Action,
    messaging::types::InlineButton,
};

/// One page of a list, with the requested index already clamped.
#[derive(Debug, PartialEq, Eq)]
pub struct Page<'a, T> {
    pub items: &'a [T],
    pub index: usize,
    pub total_pages: usize,
    pub total_items: usize,
}

/// `total_pages = ceil(n / page_size)`, at least 1. Out-of-range requests get
/// the nearest valid page.
pub fn paginate<T>(items: &[T], requested: usize, page_size: usize) -> Page<'_, T> {
    let page_size = page_size.max(1);
    let total_pages = items.len().div_ceil(page_size).max(1);
    let index = requested.min(total_pages - 1);
    let start = (index * page_size).min(items.len());
    let end = (start + page_size).min(items.len());
    Page {
        items: &items[start..end],
        index,
        total_pages,
        total_items: items.len(),
    }
}

impl<T> Page<'_, T> {
    pub fn has_prev(&self) -> bool {
        self.index > 0
    }

    pub fn has_next(&self) -> bool {
        self.index + 1 < self.total_pages
    }

    /// `◀️ | n / m | ▶️`, or nothing for a single page.
    pub fn nav_row(&self, to_page: impl Fn(usize) -> Action) -> Option<Vec<InlineButton>> {
        if self.total_pages <= 1 {
            return None;
        }
        let mut row = Vec::with_capacity(3);
        if self.has_prev() {
            row.push(InlineButton::callback("◀️", to_page(self.index - 1).encode()));
        }
        row.push(InlineButton::callback(
            format!("{} / {}", self.index + 1, self.total_pages),
            Action::Noop.encode(),
        ));
        if self.has_next() {
            row.push(InlineButton::callback("▶️", to_page(self.index + 1).encode()));
        }
        Some(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::AdminAction;

    fn groups_page(page: usize) -> Action {
        AdminAction::Groups { page }.into()
    }

    #[test]
    fn page_count_is_ceiling() {
        let items: Vec<u32> = (0..11).collect();
        assert_eq!(paginate(&items, 0, 5).total_pages, 3);
        assert_eq!(paginate(&items[..10], 0, 5).total_pages, 2);
        assert_eq!(paginate(&items[..1], 0, 5).total_pages, 1);
        let empty: Vec<u32> = Vec::new();
        let p = paginate(&empty, 4, 5);
        assert_eq!((p.total_pages, p.index, p.items.len()), (1, 0, 0));
    }

    #[test]
    fn out_of_range_pages_are_clamped() {
        let items: Vec<u32> = (0..11).collect();
        let last = paginate(&items, 2, 5);
        assert_eq!(last.items, &[10]);
        assert_eq!(paginate(&items, 99, 5), last);
        assert_eq!(paginate(&items, usize::MAX, 5), last);
    }

    #[test]
    fn nav_controls_follow_position() {
        let items: Vec<u32> = (0..11).collect();

        let first = paginate(&items, 0, 5).nav_row(groups_page).unwrap();
        let data: Vec<_> = first.iter().map(|b| b.data.as_str()).collect();
        assert_eq!(data, vec!["noop", "admin|groups|1"]);
        assert_eq!(first[0].label, "1 / 3");

        let middle = paginate(&items, 1, 5).nav_row(groups_page).unwrap();
        assert_eq!(middle.len(), 3);

        let last = paginate(&items, 2, 5).nav_row(groups_page).unwrap();
        let data: Vec<_> = last.iter().map(|b| b.data.as_str()).collect();
        assert_eq!(data, vec!["admin|groups|1", "noop"]);
    }

    #[test]
    fn single_page_has_no_nav_row() {
        let items = [1, 2, 3];
        assert!(paginate(&items, 0, 5).nav_row(groups_page).is_none());
    }
}
