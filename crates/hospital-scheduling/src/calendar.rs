//! 医护人员日程冲突检测

use hospital_core::{BookingKind, NurseAssignment, PrincipalId, TimeWindow};
use std::fmt;

use crate::pools::PoolGuard;

/// 某位医护人员已被占用的时段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conflict {
    pub staff_id: PrincipalId,
    pub kind: BookingKind,
    pub booking_id: i64,
    pub window: TimeWindow,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            BookingKind::Appointment => "appointment",
            BookingKind::Surgery => "surgery",
        };
        write!(
            f,
            "staff {} is already booked for {} {} from {} to {}",
            self.staff_id, kind, self.booking_id, self.window.start, self.window.end
        )
    }
}

/// 参与一次排期的全部医护人员：医生加上各护士
pub fn staff_of(doctor_id: PrincipalId, nurses: &[NurseAssignment]) -> Vec<PrincipalId> {
    std::iter::once(doctor_id)
        .chain(nurses.iter().map(|n| n.nurse_id))
        .collect()
}

fn involves(staff: &[PrincipalId], doctor_id: PrincipalId, nurses: &[NurseAssignment]) -> Option<PrincipalId> {
    staff
        .iter()
        .copied()
        .find(|id| *id == doctor_id || nurses.iter().any(|n| n.nurse_id == *id))
}

/// 在两个池中查找与 `window` 重叠的第一个占用
///
/// 调用方必须持有 [`PoolGuard`]，保证检查与随后的写入之间没有其他排期插入。
pub fn find_conflict(pools: &PoolGuard<'_>, staff: &[PrincipalId], window: &TimeWindow) -> Option<Conflict> {
    let appointment = pools.appointments.iter().find_map(|a| {
        if !a.window.overlaps(window) {
            return None;
        }
        involves(staff, a.doctor_id, &a.nurses).map(|staff_id| Conflict {
            staff_id,
            kind: BookingKind::Appointment,
            booking_id: a.id,
            window: a.window,
        })
    });
    if appointment.is_some() {
        return appointment;
    }

    pools.surgeries.surgeries().find_map(|s| {
        if !s.window.overlaps(window) {
            return None;
        }
        involves(staff, s.doctor_id, &s.nurses).map(|staff_id| Conflict {
            staff_id,
            kind: BookingKind::Surgery,
            booking_id: s.id,
            window: s.window,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pools::ResourcePools;
    use chrono::{TimeZone, Utc};
    use hospital_core::{Appointment, Surgery};

    fn window(from: u32, to: u32) -> TimeWindow {
        TimeWindow::new(
            Utc.with_ymd_and_hms(2099, 6, 1, from, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2099, 6, 1, to, 0, 0).unwrap(),
        )
        .unwrap()
    }

    fn nurse(id: i64) -> NurseAssignment {
        NurseAssignment { nurse_id: id, role: "scrub".to_string() }
    }

    #[tokio::test]
    async fn test_conflicts_span_both_pools() {
        let pools = ResourcePools::new();
        let mut guard = pools.acquire_exclusive().await;
        guard.appointments.insert(Appointment {
            id: 1,
            patient_id: 100,
            doctor_id: 10,
            window: window(9, 10),
            nurses: vec![nurse(20)],
            bill_id: 1,
        });
        guard.surgeries.insert_surgery(Surgery {
            id: 1,
            patient_id: 101,
            doctor_id: 11,
            window: window(12, 14),
            nurses: vec![nurse(21)],
            hospitalization_id: 1,
        });

        let hit = find_conflict(&guard, &staff_of(99, &[nurse(20)]), &window(9, 11)).unwrap();
        assert_eq!(hit.staff_id, 20);
        assert_eq!(hit.kind, BookingKind::Appointment);

        let hit = find_conflict(&guard, &[21], &window(13, 15)).unwrap();
        assert_eq!(hit.kind, BookingKind::Surgery);

        assert!(find_conflict(&guard, &[10, 11, 20, 21], &window(10, 12)).is_none());
        assert!(find_conflict(&guard, &[30], &window(9, 14)).is_none());
    }
}
