//! 일시적 오버레이 (반전/상황 이벤트/힌트).
//!
//! 트랜스크립트와 별개. 종류별로 최대 하나가 떠 있고,
//! 같은 종류가 새로 오면 이전 것을 대체한다. 명시적으로 닫을 때만 사라진다.

use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OverlayKind {
    Reversal,
    Event,
    Hint,
}

/// 화면에 띄울 오버레이
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overlay {
    pub kind: OverlayKind,
    /// 이벤트 종류 등 짧은 제목
    pub title: Option<String>,
    pub message: String,
}

impl Overlay {
    pub fn reversal(message: impl Into<String>) -> Self {
        Self {
            kind: OverlayKind::Reversal,
            title: None,
            message: message.into(),
        }
    }

    pub fn event(title: impl Into<String>, message: impl Into<String>) -> Self {
        let title = title.into();
        Self {
            kind: OverlayKind::Event,
            title: (!title.is_empty()).then_some(title),
            message: message.into(),
        }
    }

    pub fn hint(message: impl Into<String>) -> Self {
        Self {
            kind: OverlayKind::Hint,
            title: None,
            message: message.into(),
        }
    }
}

/// 현재 떠 있는 오버레이 집합
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overlays {
    active: BTreeMap<OverlayKind, Overlay>,
}

impl Overlays {
    /// 오버레이 설정. 같은 종류의 이전 오버레이를 반환
    pub fn set(&mut self, overlay: Overlay) -> Option<Overlay> {
        self.active.insert(overlay.kind, overlay)
    }

    /// 닫기. 떠 있던 경우에만 `true`
    pub fn dismiss(&mut self, kind: OverlayKind) -> bool {
        self.active.remove(&kind).is_some()
    }

    pub fn get(&self, kind: OverlayKind) -> Option<&Overlay> {
        self.active.get(&kind)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Overlay> {
        self.active.values()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}
