//! Splitting sales mass across virgin substreams.

use crate::{Parameterization, StreamBank};
use primitives::{Decimal, StreamKind};

/// Fractions of a sales total attributed to each virgin substream.
///
/// Only enabled streams receive mass. When every enabled stream is zero the
/// split is equal across them; otherwise it is proportional to current
/// values. Exports are excluded unless requested, matching treaty
/// attribution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SalesDistribution {
    /// Fraction routed to `domestic`, 0..=1.
    pub domestic: Decimal,
    /// Fraction routed to `import`, 0..=1.
    pub import: Decimal,
    /// Fraction routed to `export`, 0..=1. Zero unless exports included.
    pub export: Decimal,
}

impl SalesDistribution {
    /// Builds the distribution for a substance from its current stream
    /// values and enabled flags.
    pub fn for_substance(
        bank: &StreamBank,
        params: &Parameterization,
        include_exports: bool,
    ) -> Self {
        let mut streams = vec![
            (StreamKind::Domestic, bank.amount(StreamKind::Domestic)),
            (StreamKind::Import, bank.amount(StreamKind::Import)),
        ];
        if include_exports {
            streams.push((StreamKind::Export, bank.amount(StreamKind::Export)));
        }
        streams.retain(|(kind, _)| params.is_enabled(*kind));

        let mut out = Self::default();
        if streams.is_empty() {
            return out;
        }

        let total: Decimal = streams.iter().map(|(_, amount)| *amount).sum();
        if total.is_zero() {
            let share = Decimal::ONE / Decimal::from(streams.len() as u32);
            for (kind, _) in &streams {
                out.assign(*kind, share);
            }
        } else {
            for (kind, amount) in &streams {
                out.assign(*kind, amount / total);
            }
        }
        out
    }

    /// The fraction for one substream.
    pub fn fraction(&self, kind: StreamKind) -> Decimal {
        match kind {
            StreamKind::Domestic => self.domestic,
            StreamKind::Import => self.import,
            StreamKind::Export => self.export,
            _ => Decimal::ZERO,
        }
    }

    fn assign(&mut self, kind: StreamKind, share: Decimal) {
        match kind {
            StreamKind::Domestic => self.domestic = share,
            StreamKind::Import => self.import = share,
            StreamKind::Export => self.export = share,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use primitives::StreamKind;
    use rust_decimal_macros::dec;

    fn enabled(streams: &[StreamKind]) -> Parameterization {
        let mut params = Parameterization::new();
        for stream in streams {
            params.mark_stream_enabled(*stream).unwrap();
        }
        params
    }

    #[test]
    fn proportional_when_values_present() {
        let mut bank = StreamBank::new();
        bank.set(StreamKind::Domestic, dec!(30)).unwrap();
        bank.set(StreamKind::Import, dec!(10)).unwrap();
        let params = enabled(&[StreamKind::Domestic, StreamKind::Import]);
        let dist = SalesDistribution::for_substance(&bank, &params, false);
        assert_eq!(dist.domestic, dec!(0.75));
        assert_eq!(dist.import, dec!(0.25));
        assert_eq!(dist.export, dec!(0));
    }

    #[test]
    fn equal_split_when_all_enabled_are_zero() {
        let bank = StreamBank::new();
        let params = enabled(&[StreamKind::Domestic, StreamKind::Import]);
        let dist = SalesDistribution::for_substance(&bank, &params, false);
        assert_eq!(dist.domestic, dec!(0.5));
        assert_eq!(dist.import, dec!(0.5));
    }

    #[test]
    fn disabled_streams_receive_nothing() {
        let mut bank = StreamBank::new();
        bank.set(StreamKind::Domestic, dec!(30)).unwrap();
        bank.set(StreamKind::Import, dec!(10)).unwrap();
        let params = enabled(&[StreamKind::Domestic]);
        let dist = SalesDistribution::for_substance(&bank, &params, false);
        assert_eq!(dist.domestic, dec!(1));
        assert_eq!(dist.import, dec!(0));
    }

    #[test]
    fn exports_join_only_when_requested() {
        let mut bank = StreamBank::new();
        bank.set(StreamKind::Domestic, dec!(10)).unwrap();
        bank.set(StreamKind::Export, dec!(10)).unwrap();
        let params = enabled(&[StreamKind::Domestic, StreamKind::Export]);
        let excluded = SalesDistribution::for_substance(&bank, &params, false);
        assert_eq!(excluded.domestic, dec!(1));
        assert_eq!(excluded.export, dec!(0));
        let included = SalesDistribution::for_substance(&bank, &params, true);
        assert_eq!(included.domestic, dec!(0.5));
        assert_eq!(included.export, dec!(0.5));
    }

    #[test]
    fn nothing_enabled_yields_zero_distribution() {
        let bank = StreamBank::new();
        let params = Parameterization::new();
        let dist = SalesDistribution::for_substance(&bank, &params, false);
        assert_eq!(dist, SalesDistribution::default());
    }
}
