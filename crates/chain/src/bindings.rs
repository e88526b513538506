//! Contract interfaces for the lending protocol.
//!
//! Only the functions the liquidation engine consumes are declared.

use alloy::sol;

sol! {
    /// Lending pool: positions, health factors and liquidation entrypoint.
    #[sol(rpc)]
    #[derive(Debug)]
    interface ILendingPool {
        function getPosition(address user) external view returns (
            uint256 collateral,
            uint256 borrowed,
            uint256 lastUpdate,
            uint256 interest
        );

        /// Health factor with 2 implied decimals (100 = 1.00).
        function getHealthFactor(address user) external view returns (uint256);

        /// Repays the user's debt with `msg.value` and seizes collateral plus bonus.
        function liquidate(address user) external payable;
    }

    /// Per-user, per-asset collateral accounting.
    #[sol(rpc)]
    #[derive(Debug)]
    interface ICollateralManager {
        function getUserCollaterals(address user) external view returns (
            address[] memory assets,
            uint256[] memory amounts,
            uint256[] memory valuesUsd
        );

        function getCollateralValueUSD(address user) external view returns (uint256);

        function getMaxBorrowValue(address user) external view returns (uint256);
    }

    /// Price source with emergency mode and cached fallback prices.
    #[sol(rpc)]
    #[derive(Debug)]
    interface IOracleAggregator {
        function getPrice(address asset) external view returns (uint256);

        function getCachedPrice(address asset) external view returns (
            uint256 price,
            uint256 updatedAt,
            uint8 source
        );

        function emergencyMode() external view returns (bool);
    }
}
