use chrono::{NaiveDate, TimeZone};
use serde::Serialize;

use crate::HistoryGroup;

/// Groups that share a calendar date in the display time zone.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DateBucket {
    pub date: NaiveDate,
    pub groups: Vec<HistoryGroup>,
}

/// Bucket groups by the local date of their representative timestamp, most recent date
/// first. Groups keep their newest-first order inside a bucket.
pub fn bucket_by_date<Tz: TimeZone>(groups: Vec<HistoryGroup>, tz: &Tz) -> Vec<DateBucket> {
    let mut keyed: Vec<(NaiveDate, HistoryGroup)> = groups
        .into_iter()
        .map(|group| (group.timestamp().with_timezone(tz).date_naive(), group))
        .collect();
    keyed.sort_by(|(date_a, group_a), (date_b, group_b)| {
        date_b
            .cmp(date_a)
            .then(group_b.timestamp().cmp(&group_a.timestamp()))
    });

    let mut buckets: Vec<DateBucket> = Vec::new();
    for (date, group) in keyed {
        match buckets.last_mut() {
            Some(bucket) if bucket.date == date => bucket.groups.push(group),
            _ => buckets.push(DateBucket {
                date,
                groups: vec![group],
            }),
        }
    }
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, FixedOffset, Utc};
    use purse_core::{Direction, Transaction, TransactionKind, WalletType};

    fn single(timestamp: DateTime<Utc>) -> HistoryGroup {
        HistoryGroup::Single {
            transaction: Transaction::new(
                "u",
                WalletType::Actual,
                Direction::Credit,
                TransactionKind::Refund,
                5,
                5,
                timestamp,
            ),
        }
    }

    fn utc(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn newest_date_first() {
        let groups = vec![single(utc(1, 9)), single(utc(3, 8)), single(utc(3, 20)), single(utc(2, 1))];
        let buckets = bucket_by_date(groups, &Utc);
        let dates: Vec<u32> = buckets
            .iter()
            .map(|bucket| chrono::Datelike::day(&bucket.date))
            .collect();
        assert_eq!(dates, vec![3, 2, 1]);
        assert_eq!(buckets[0].groups.len(), 2);
        assert_eq!(buckets[0].groups[0].timestamp(), utc(3, 20));
    }

    #[test]
    fn respects_display_zone() {
        let plus_five = FixedOffset::east_opt(5 * 3600).unwrap();
        let buckets = bucket_by_date(vec![single(utc(1, 20)), single(utc(2, 1))], &plus_five);
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[0].date, NaiveDate::from_ymd_opt(2024, 3, 2).unwrap());
    }

    #[test]
    fn empty_input() {
        assert!(bucket_by_date(Vec::new(), &Utc).is_empty());
    }
}
